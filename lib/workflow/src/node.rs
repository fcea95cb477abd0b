//! Workflow and node records.
//!
//! These are read-only during execution: the launcher loads them in bulk to
//! expand a workflow into per-node work-items.

use crate::param::ParamSpec;
use miniflow_core::{CustomScriptId, NodeId, ScriptId, WorkflowId, WorkspaceId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A workflow definition header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Human-readable name.
    pub name: String,
    /// Scheduling priority inherited by this workflow's execution inputs.
    pub priority: i32,
}

/// The executable a node is bound to. Exactly one of the two kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptRef {
    /// A global script, shared across workspaces.
    Global { script_id: ScriptId },
    /// A workspace-scoped custom script.
    Custom { custom_script_id: CustomScriptId },
}

/// A unit of work in a workflow, bound to a script and parameter specs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier.
    pub id: NodeId,
    /// The workflow this node belongs to.
    pub workflow_id: WorkflowId,
    /// Human-readable name.
    pub name: String,
    /// The script this node executes.
    pub executable: ScriptRef,
    /// Declared parameters, by name.
    pub input_params: BTreeMap<String, ParamSpec>,
    /// How many times the worker engine may retry the script.
    pub max_retries: i32,
    /// Wall-clock limit for a single script run, in seconds.
    pub timeout_seconds: i32,
}

impl Node {
    /// Creates a node bound to a global script with no parameters.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, name: impl Into<String>, script_id: ScriptId) -> Self {
        Self {
            id: NodeId::new(),
            workflow_id,
            name: name.into(),
            executable: ScriptRef::Global { script_id },
            input_params: BTreeMap::new(),
            max_retries: 3,
            timeout_seconds: 300,
        }
    }

    /// Adds a declared parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.input_params.insert(name.into(), spec);
        self
    }
}

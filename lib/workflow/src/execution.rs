//! Execution state records.
//!
//! An execution owns two transient row sets while it is live: one
//! `ExecutionInput` per not-yet-dispatched node and one `ExecutionOutput`
//! per finished node attempt. At the terminal transition both sets are
//! collected into the execution's `results` map and deleted.

use crate::param::ParamEntry;
use crate::status::{ExecutionStatus, NodeRunStatus};
use chrono::{DateTime, Utc};
use miniflow_core::{
    ExecutionId, ExecutionInputId, ExecutionOutputId, NodeId, TriggerId, WorkflowId, WorkspaceId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Consolidated per-node results, keyed by node id.
pub type ResultMap = BTreeMap<NodeId, NodeResult>;

/// One run of a workflow from start to terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier.
    pub id: ExecutionId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// The workflow being executed.
    pub workflow_id: WorkflowId,
    /// The trigger that started this execution, if any.
    pub trigger_id: Option<TriggerId>,
    /// Current status.
    pub status: ExecutionStatus,
    /// When the execution was created.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    pub ended_at: Option<DateTime<Utc>>,
    /// The payload the execution was started with.
    pub trigger_data: JsonValue,
    /// Consolidated per-node results; written once, at the terminal
    /// transition.
    pub results: ResultMap,
    /// Who or what started the execution.
    pub created_by: Option<String>,
}

impl Execution {
    /// Creates a new pending execution.
    #[must_use]
    pub fn new(
        workspace_id: WorkspaceId,
        workflow_id: WorkflowId,
        trigger_id: Option<TriggerId>,
        trigger_data: JsonValue,
        created_by: Option<String>,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workspace_id,
            workflow_id,
            trigger_id,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            trigger_data,
            results: ResultMap::new(),
            created_by,
        }
    }

    /// Returns the wall-clock duration, if the execution has ended.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|ended| ended - self.started_at)
    }
}

/// A node's pending work-item for a specific execution.
///
/// `dependency_count` mirrors the number of predecessors without a
/// successful output; the row becomes ready at zero. `wait_factor` rises on
/// every tick the row is ready but not selected, nudging it ahead under
/// priority ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionInput {
    /// Unique identifier.
    pub id: ExecutionInputId,
    /// The execution this work-item belongs to.
    pub execution_id: ExecutionId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// The workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// The node to run.
    pub node_id: NodeId,
    /// The node's name at launch time.
    pub node_name: String,
    /// The resolved script's name at launch time.
    pub script_name: String,
    /// The resolved script path handed to the worker engine.
    pub script_path: String,
    /// Declared parameters, copied verbatim from the node.
    pub params: BTreeMap<String, ParamEntry>,
    /// Number of predecessors without a successful output.
    pub dependency_count: i32,
    /// Starvation-avoidance counter.
    pub wait_factor: i32,
    /// Scheduling priority (inherited from the workflow).
    pub priority: i32,
    /// Worker-engine retry budget.
    pub max_retries: i32,
    /// Worker-engine wall clock, in seconds.
    pub timeout_seconds: i32,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
}

/// A node's completed work-item for a specific execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Unique identifier.
    pub id: ExecutionOutputId,
    /// The execution this result belongs to.
    pub execution_id: ExecutionId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// The workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// The node that ran.
    pub node_id: NodeId,
    /// Outcome of the run.
    pub status: NodeRunStatus,
    /// The node's return value.
    pub result_data: JsonValue,
    /// When the script started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the script ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Script wall-clock seconds.
    pub duration_seconds: Option<f64>,
    /// Peak memory, in megabytes.
    pub memory_mb: Option<f64>,
    /// Average CPU usage, percent.
    pub cpu_percent: Option<f64>,
    /// Error message for failed runs.
    pub error_message: Option<String>,
    /// Structured error details for failed runs.
    pub error_details: Option<JsonValue>,
    /// How many times the worker engine retried the script.
    pub retry_count: i32,
}

/// A consolidated per-node result entry in `Execution.results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Outcome of the node.
    pub status: NodeRunStatus,
    /// The node's return value, if it ran.
    pub result_data: Option<JsonValue>,
    /// Peak memory, in megabytes.
    pub memory_mb: Option<f64>,
    /// Average CPU usage, percent.
    pub cpu_percent: Option<f64>,
    /// Script wall-clock seconds.
    pub duration_seconds: Option<f64>,
    /// Error message, if any.
    pub error_message: Option<String>,
    /// Structured error details, if any.
    pub error_details: Option<JsonValue>,
}

impl NodeResult {
    /// Builds the consolidated entry for a finished node.
    #[must_use]
    pub fn from_output(output: &ExecutionOutput) -> Self {
        Self {
            status: output.status,
            result_data: Some(output.result_data.clone()),
            memory_mb: output.memory_mb,
            cpu_percent: output.cpu_percent,
            duration_seconds: output.duration_seconds,
            error_message: output.error_message.clone(),
            error_details: output.error_details.clone(),
        }
    }

    /// Builds the entry for a node cancelled by a peer failure.
    #[must_use]
    pub fn cancelled_by_failure(failed_node_id: NodeId) -> Self {
        Self {
            status: NodeRunStatus::Cancelled,
            result_data: None,
            memory_mb: None,
            cpu_percent: None,
            duration_seconds: None,
            error_message: Some(format!(
                "Cancelled because of failed node: {failed_node_id}"
            )),
            error_details: Some(serde_json::json!({
                "failed_node_id": failed_node_id,
            })),
        }
    }

    /// Builds the entry for a node cancelled by an explicit abort.
    #[must_use]
    pub fn cancelled_explicitly() -> Self {
        Self {
            status: NodeRunStatus::Cancelled,
            result_data: None,
            memory_mb: None,
            cpu_percent: None,
            duration_seconds: None,
            error_message: Some("Execution cancelled".to_string()),
            error_details: None,
        }
    }
}

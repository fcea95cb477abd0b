//! Script records: the executables nodes are bound to.
//!
//! Global scripts are shared across workspaces; custom scripts belong to a
//! single workspace. Both are interchangeable as executables.

use miniflow_core::{CustomScriptId, ScriptId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A globally available script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Unique identifier.
    pub id: ScriptId,
    /// Human-readable name.
    pub name: String,
    /// Path of the script file, relative to the global script root.
    pub file_path: String,
    /// Declared input schema, if any.
    pub input_schema: Option<JsonValue>,
    /// Declared output schema, if any.
    pub output_schema: Option<JsonValue>,
}

/// A workspace-scoped custom script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomScript {
    /// Unique identifier.
    pub id: CustomScriptId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Human-readable name.
    pub name: String,
    /// Path of the script file, relative to the workspace script root.
    pub file_path: String,
    /// Declared input schema, if any.
    pub input_schema: Option<JsonValue>,
    /// Declared output schema, if any.
    pub output_schema: Option<JsonValue>,
}

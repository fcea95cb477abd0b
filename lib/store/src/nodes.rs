//! Repository for workflow nodes.

use crate::{decode_err, parse_id};
use miniflow_core::WorkflowId;
use miniflow_workflow::node::{Node, ScriptRef};
use miniflow_workflow::param::ParamSpec;
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeMap;

#[derive(FromRow)]
struct NodeRow {
    id: String,
    workflow_id: String,
    name: String,
    script_id: Option<String>,
    custom_script_id: Option<String>,
    input_params: serde_json::Value,
    max_retries: i32,
    timeout_seconds: i32,
}

impl NodeRow {
    fn try_into_record(self) -> Result<Node, sqlx::Error> {
        // Exactly one executable reference per node.
        let executable = match (self.script_id.as_deref(), self.custom_script_id.as_deref()) {
            (Some(script_id), None) => ScriptRef::Global {
                script_id: parse_id("script id", script_id)?,
            },
            (None, Some(custom_script_id)) => ScriptRef::Custom {
                custom_script_id: parse_id("custom script id", custom_script_id)?,
            },
            (Some(_), Some(_)) => {
                return Err(decode_err(format!(
                    "node {}: both script_id and custom_script_id set",
                    self.id
                )));
            }
            (None, None) => {
                return Err(decode_err(format!("node {}: no executable", self.id)));
            }
        };

        let input_params: BTreeMap<String, ParamSpec> = serde_json::from_value(self.input_params)
            .map_err(|e| decode_err(format!("node {}: invalid input_params: {e}", self.id)))?;

        Ok(Node {
            id: parse_id("node id", &self.id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            name: self.name,
            executable,
            input_params,
            max_retries: self.max_retries,
            timeout_seconds: self.timeout_seconds,
        })
    }
}

/// Fetches all nodes of one workflow.
pub async fn fetch_by_workflow(
    conn: &mut PgConnection,
    workflow_id: WorkflowId,
    include_deleted: bool,
) -> Result<Vec<Node>, sqlx::Error> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let rows: Vec<NodeRow> = sqlx::query_as(&format!(
        "SELECT id, workflow_id, name, script_id, custom_script_id, input_params, \
                max_retries, timeout_seconds \
         FROM nodes WHERE workflow_id = $1{filter}"
    ))
    .bind(workflow_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(NodeRow::try_into_record).collect()
}

//! Repository for workflow definition headers.

use crate::parse_id;
use miniflow_core::WorkflowId;
use miniflow_workflow::node::Workflow;
use sqlx::{FromRow, PgConnection};

#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    workspace_id: String,
    name: String,
    priority: i32,
}

impl WorkflowRow {
    fn try_into_record(self) -> Result<Workflow, sqlx::Error> {
        Ok(Workflow {
            id: parse_id("workflow id", &self.id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            name: self.name,
            priority: self.priority,
        })
    }
}

/// Fetches a workflow by id.
pub async fn fetch_by_id(
    conn: &mut PgConnection,
    id: WorkflowId,
    include_deleted: bool,
) -> Result<Option<Workflow>, sqlx::Error> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let row: Option<WorkflowRow> = sqlx::query_as(&format!(
        "SELECT id, workspace_id, name, priority FROM workflows WHERE id = $1{filter}"
    ))
    .bind(id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(WorkflowRow::try_into_record).transpose()
}

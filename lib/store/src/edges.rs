//! Repository for workflow edges.

use crate::parse_id;
use miniflow_core::{NodeId, WorkflowId};
use miniflow_workflow::edge::Edge;
use sqlx::{FromRow, PgConnection};

#[derive(FromRow)]
struct EdgeRow {
    id: String,
    workflow_id: String,
    from_node_id: String,
    to_node_id: String,
}

impl EdgeRow {
    fn try_into_record(self) -> Result<Edge, sqlx::Error> {
        Ok(Edge {
            id: parse_id("edge id", &self.id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            from_node_id: parse_id("from node id", &self.from_node_id)?,
            to_node_id: parse_id("to node id", &self.to_node_id)?,
        })
    }
}

/// Fetches all edges of one workflow.
pub async fn fetch_by_workflow(
    conn: &mut PgConnection,
    workflow_id: WorkflowId,
    include_deleted: bool,
) -> Result<Vec<Edge>, sqlx::Error> {
    let filter = if include_deleted {
        ""
    } else {
        " AND deleted_at IS NULL"
    };
    let rows: Vec<EdgeRow> = sqlx::query_as(&format!(
        "SELECT id, workflow_id, from_node_id, to_node_id \
         FROM edges WHERE workflow_id = $1{filter}"
    ))
    .bind(workflow_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(EdgeRow::try_into_record).collect()
}

/// Fetches the edges leaving one node. The output handler fans out
/// dependency decrements over the targets of these edges.
pub async fn fetch_from_node(
    conn: &mut PgConnection,
    workflow_id: WorkflowId,
    from_node_id: NodeId,
) -> Result<Vec<Edge>, sqlx::Error> {
    let rows: Vec<EdgeRow> = sqlx::query_as(
        "SELECT id, workflow_id, from_node_id, to_node_id \
         FROM edges \
         WHERE workflow_id = $1 AND from_node_id = $2 AND deleted_at IS NULL",
    )
    .bind(workflow_id.to_string())
    .bind(from_node_id.to_string())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(EdgeRow::try_into_record).collect()
}

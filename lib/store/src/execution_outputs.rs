//! Repository for execution output rows (the completed work-items).

use crate::{decode_err, parse_id};
use chrono::{DateTime, Utc};
use miniflow_core::{ExecutionId, NodeId};
use miniflow_workflow::execution::ExecutionOutput;
use miniflow_workflow::status::NodeRunStatus;
use sqlx::{FromRow, PgConnection};

const SELECT_COLUMNS: &str = r#"
    SELECT id, execution_id, workspace_id, workflow_id, node_id, status,
           result_data, started_at, ended_at, duration_seconds, memory_mb,
           cpu_percent, error_message, error_details, retry_count
    FROM execution_outputs
"#;

#[derive(FromRow)]
struct ExecutionOutputRow {
    id: String,
    execution_id: String,
    workspace_id: String,
    workflow_id: String,
    node_id: String,
    status: String,
    result_data: serde_json::Value,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_seconds: Option<f64>,
    memory_mb: Option<f64>,
    cpu_percent: Option<f64>,
    error_message: Option<String>,
    error_details: Option<serde_json::Value>,
    retry_count: i32,
}

impl ExecutionOutputRow {
    fn try_into_record(self) -> Result<ExecutionOutput, sqlx::Error> {
        let status: NodeRunStatus = self
            .status
            .parse()
            .map_err(|e| decode_err(format!("execution output {}: {e}", self.id)))?;

        Ok(ExecutionOutput {
            id: parse_id("execution output id", &self.id)?,
            execution_id: parse_id("execution id", &self.execution_id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            node_id: parse_id("node id", &self.node_id)?,
            status,
            result_data: self.result_data,
            started_at: self.started_at,
            ended_at: self.ended_at,
            duration_seconds: self.duration_seconds,
            memory_mb: self.memory_mb,
            cpu_percent: self.cpu_percent,
            error_message: self.error_message,
            error_details: self.error_details,
            retry_count: self.retry_count,
        })
    }
}

/// Inserts one execution output row.
pub async fn insert(conn: &mut PgConnection, output: &ExecutionOutput) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO execution_outputs
            (id, execution_id, workspace_id, workflow_id, node_id, status,
             result_data, started_at, ended_at, duration_seconds, memory_mb,
             cpu_percent, error_message, error_details, retry_count)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(output.id.to_string())
    .bind(output.execution_id.to_string())
    .bind(output.workspace_id.to_string())
    .bind(output.workflow_id.to_string())
    .bind(output.node_id.to_string())
    .bind(output.status.as_str())
    .bind(&output.result_data)
    .bind(output.started_at)
    .bind(output.ended_at)
    .bind(output.duration_seconds)
    .bind(output.memory_mb)
    .bind(output.cpu_percent)
    .bind(&output.error_message)
    .bind(&output.error_details)
    .bind(output.retry_count)
    .execute(conn)
    .await?;

    Ok(())
}

/// Fetches all outputs of one execution.
pub async fn fetch_by_execution(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
) -> Result<Vec<ExecutionOutput>, sqlx::Error> {
    let rows: Vec<ExecutionOutputRow> =
        sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE execution_id = $1"))
            .bind(execution_id.to_string())
            .fetch_all(conn)
            .await?;

    rows.into_iter()
        .map(ExecutionOutputRow::try_into_record)
        .collect()
}

/// Fetches the output of one node within one execution, if it exists.
pub async fn fetch_by_execution_and_node(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
    node_id: NodeId,
) -> Result<Option<ExecutionOutput>, sqlx::Error> {
    let row: Option<ExecutionOutputRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE execution_id = $1 AND node_id = $2"
    ))
    .bind(execution_id.to_string())
    .bind(node_id.to_string())
    .fetch_optional(conn)
    .await?;

    row.map(ExecutionOutputRow::try_into_record).transpose()
}

/// Deletes all outputs of one execution.
pub async fn delete_by_execution(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM execution_outputs WHERE execution_id = $1")
        .bind(execution_id.to_string())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

//! Repository for execution rows.

use crate::pagination::Page;
use crate::{decode_err, parse_id};
use chrono::{DateTime, Utc};
use miniflow_core::{ExecutionId, WorkspaceId};
use miniflow_workflow::execution::{Execution, ResultMap};
use miniflow_workflow::status::ExecutionStatus;
use sqlx::{FromRow, PgConnection};

const SELECT_COLUMNS: &str = r#"
    SELECT id, workspace_id, workflow_id, trigger_id, status, started_at,
           ended_at, trigger_data, results, created_by
    FROM executions
"#;

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workspace_id: String,
    workflow_id: String,
    trigger_id: Option<String>,
    status: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    trigger_data: serde_json::Value,
    results: serde_json::Value,
    created_by: Option<String>,
}

impl ExecutionRow {
    fn try_into_record(self) -> Result<Execution, sqlx::Error> {
        let status: ExecutionStatus = self
            .status
            .parse()
            .map_err(|e| decode_err(format!("execution {}: {e}", self.id)))?;
        let results: ResultMap = serde_json::from_value(self.results)
            .map_err(|e| decode_err(format!("execution {}: invalid results: {e}", self.id)))?;

        Ok(Execution {
            id: parse_id("execution id", &self.id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            trigger_id: self
                .trigger_id
                .as_deref()
                .map(|t| parse_id("trigger id", t))
                .transpose()?,
            status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            trigger_data: self.trigger_data,
            results,
            created_by: self.created_by,
        })
    }
}

/// Inserts a new execution row.
pub async fn insert(conn: &mut PgConnection, execution: &Execution) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO executions
            (id, workspace_id, workflow_id, trigger_id, status, started_at,
             ended_at, trigger_data, results, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(execution.id.to_string())
    .bind(execution.workspace_id.to_string())
    .bind(execution.workflow_id.to_string())
    .bind(execution.trigger_id.map(|t| t.to_string()))
    .bind(execution.status.as_str())
    .bind(execution.started_at)
    .bind(execution.ended_at)
    .bind(&execution.trigger_data)
    .bind(serde_json::to_value(&execution.results).map_err(|e| decode_err(e.to_string()))?)
    .bind(&execution.created_by)
    .execute(conn)
    .await?;

    Ok(())
}

/// Fetches an execution by id.
pub async fn fetch_by_id(
    conn: &mut PgConnection,
    id: ExecutionId,
) -> Result<Option<Execution>, sqlx::Error> {
    let row: Option<ExecutionRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

    row.map(ExecutionRow::try_into_record).transpose()
}

/// Fetches an execution by id, taking a row lock.
///
/// Finalizers use this so the first terminal transition wins and a
/// concurrent second finalizer observes the terminal status.
pub async fn fetch_by_id_for_update(
    conn: &mut PgConnection,
    id: ExecutionId,
) -> Result<Option<Execution>, sqlx::Error> {
    let row: Option<ExecutionRow> =
        sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1 FOR UPDATE"))
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;

    row.map(ExecutionRow::try_into_record).transpose()
}

/// Writes the terminal status, end time and consolidated results.
pub async fn finalize(
    conn: &mut PgConnection,
    id: ExecutionId,
    status: ExecutionStatus,
    ended_at: DateTime<Utc>,
    results: &ResultMap,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE executions
        SET status = $2, ended_at = $3, results = $4
        WHERE id = $1
        "#,
    )
    .bind(id.to_string())
    .bind(status.as_str())
    .bind(ended_at)
    .bind(serde_json::to_value(results).map_err(|e| decode_err(e.to_string()))?)
    .execute(conn)
    .await?;

    Ok(())
}

/// Flips pending executions to running once their first inputs are in
/// flight. Already-running or terminal executions are left alone.
pub async fn mark_running(
    conn: &mut PgConnection,
    ids: &[ExecutionId],
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let result = sqlx::query(
        r#"
        UPDATE executions
        SET status = 'RUNNING'
        WHERE id = ANY($1) AND status = 'PENDING'
        "#,
    )
    .bind(&ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Lists a workspace's executions with a given status, newest first.
pub async fn list_by_workspace_and_status(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    status: ExecutionStatus,
    page: &Page,
) -> Result<Vec<Execution>, sqlx::Error> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE workspace_id = $1 AND status = $2 \
         ORDER BY started_at {} LIMIT $3 OFFSET $4",
        page.order_keyword(),
    ))
    .bind(workspace_id.to_string())
    .bind(status.as_str())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(ExecutionRow::try_into_record).collect()
}

/// Lists a workspace's executions regardless of status, newest first.
pub async fn list_by_workspace(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    page: &Page,
) -> Result<Vec<Execution>, sqlx::Error> {
    let rows: Vec<ExecutionRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} WHERE workspace_id = $1 \
         ORDER BY started_at {} LIMIT $2 OFFSET $3",
        page.order_keyword(),
    ))
    .bind(workspace_id.to_string())
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(ExecutionRow::try_into_record).collect()
}

/// Counts a workspace's executions, optionally restricted to one status.
pub async fn count_by_workspace(
    conn: &mut PgConnection,
    workspace_id: WorkspaceId,
    status: Option<ExecutionStatus>,
) -> Result<i64, sqlx::Error> {
    let count: (i64,) = match status {
        Some(status) => {
            sqlx::query_as(
                "SELECT COUNT(*) FROM executions WHERE workspace_id = $1 AND status = $2",
            )
            .bind(workspace_id.to_string())
            .bind(status.as_str())
            .fetch_one(conn)
            .await?
        }
        None => {
            sqlx::query_as("SELECT COUNT(*) FROM executions WHERE workspace_id = $1")
                .bind(workspace_id.to_string())
                .fetch_one(conn)
                .await?
        }
    };

    Ok(count.0)
}

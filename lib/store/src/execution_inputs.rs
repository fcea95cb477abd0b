//! Repository for execution input rows (the pending work-items).
//!
//! The ready-set queries here are the heart of the scheduler's
//! concurrency story: selection locks the chosen rows (`FOR UPDATE SKIP
//! LOCKED`) so concurrent engine instances never fight over the same batch,
//! and the dependency decrement is a single guarded UPDATE so sibling
//! completions serialize on row locks instead of in-process state.

use crate::{decode_err, parse_id};
use chrono::{DateTime, Utc};
use miniflow_core::{ExecutionId, ExecutionInputId, NodeId};
use miniflow_workflow::execution::ExecutionInput;
use miniflow_workflow::param::ParamEntry;
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeMap;

const SELECT_COLUMNS: &str = r#"
    SELECT id, execution_id, workspace_id, workflow_id, node_id, node_name,
           script_name, script_path, params, dependency_count, wait_factor,
           priority, max_retries, timeout_seconds, created_at
    FROM execution_inputs
"#;

#[derive(FromRow)]
struct ExecutionInputRow {
    id: String,
    execution_id: String,
    workspace_id: String,
    workflow_id: String,
    node_id: String,
    node_name: String,
    script_name: String,
    script_path: String,
    params: serde_json::Value,
    dependency_count: i32,
    wait_factor: i32,
    priority: i32,
    max_retries: i32,
    timeout_seconds: i32,
    created_at: DateTime<Utc>,
}

impl ExecutionInputRow {
    fn try_into_record(self) -> Result<ExecutionInput, sqlx::Error> {
        let params: BTreeMap<String, ParamEntry> = serde_json::from_value(self.params)
            .map_err(|e| decode_err(format!("execution input {}: invalid params: {e}", self.id)))?;

        Ok(ExecutionInput {
            id: parse_id("execution input id", &self.id)?,
            execution_id: parse_id("execution id", &self.execution_id)?,
            workspace_id: parse_id("workspace id", &self.workspace_id)?,
            workflow_id: parse_id("workflow id", &self.workflow_id)?,
            node_id: parse_id("node id", &self.node_id)?,
            node_name: self.node_name,
            script_name: self.script_name,
            script_path: self.script_path,
            params,
            dependency_count: self.dependency_count,
            wait_factor: self.wait_factor,
            priority: self.priority,
            max_retries: self.max_retries,
            timeout_seconds: self.timeout_seconds,
            created_at: self.created_at,
        })
    }
}

/// Inserts one execution input row.
pub async fn insert(conn: &mut PgConnection, input: &ExecutionInput) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO execution_inputs
            (id, execution_id, workspace_id, workflow_id, node_id, node_name,
             script_name, script_path, params, dependency_count, wait_factor,
             priority, max_retries, timeout_seconds, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(input.id.to_string())
    .bind(input.execution_id.to_string())
    .bind(input.workspace_id.to_string())
    .bind(input.workflow_id.to_string())
    .bind(input.node_id.to_string())
    .bind(&input.node_name)
    .bind(&input.script_name)
    .bind(&input.script_path)
    .bind(serde_json::to_value(&input.params).map_err(|e| decode_err(e.to_string()))?)
    .bind(input.dependency_count)
    .bind(input.wait_factor)
    .bind(input.priority)
    .bind(input.max_retries)
    .bind(input.timeout_seconds)
    .bind(input.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

/// Fetches one execution input by id.
pub async fn fetch_by_id(
    conn: &mut PgConnection,
    id: ExecutionInputId,
) -> Result<Option<ExecutionInput>, sqlx::Error> {
    let row: Option<ExecutionInputRow> =
        sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;

    row.map(ExecutionInputRow::try_into_record).transpose()
}

/// Selects up to `batch_size` ready rows (`dependency_count = 0`), ordered
/// by priority, then wait factor, then age. Rows locked by another engine
/// instance are skipped rather than waited on.
pub async fn fetch_ready(
    conn: &mut PgConnection,
    batch_size: i64,
) -> Result<Vec<ExecutionInput>, sqlx::Error> {
    let rows: Vec<ExecutionInputRow> = sqlx::query_as(&format!(
        "{SELECT_COLUMNS} \
         WHERE dependency_count = 0 \
         ORDER BY priority DESC, wait_factor DESC, created_at ASC \
         LIMIT $1 \
         FOR UPDATE SKIP LOCKED"
    ))
    .bind(batch_size)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(ExecutionInputRow::try_into_record)
        .collect()
}

/// Bumps the wait factor of every ready row that was not selected this
/// tick, so unpicked rows climb the ordering instead of starving. Rows
/// locked by another engine instance are skipped, never waited on.
pub async fn increment_wait_factor_except(
    conn: &mut PgConnection,
    selected: &[ExecutionInputId],
) -> Result<u64, sqlx::Error> {
    let selected: Vec<String> = selected.iter().map(ToString::to_string).collect();
    let result = sqlx::query(
        r#"
        UPDATE execution_inputs
        SET wait_factor = wait_factor + 1
        WHERE id IN (
            SELECT id FROM execution_inputs
            WHERE dependency_count = 0 AND NOT (id = ANY($1))
            FOR UPDATE SKIP LOCKED
        )
        "#,
    )
    .bind(&selected)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Decrements the dependency count of the given nodes of one execution,
/// never going below zero.
pub async fn decrement_dependency_counts(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
    node_ids: &[NodeId],
) -> Result<u64, sqlx::Error> {
    if node_ids.is_empty() {
        return Ok(0);
    }

    let node_ids: Vec<String> = node_ids.iter().map(ToString::to_string).collect();
    let result = sqlx::query(
        r#"
        UPDATE execution_inputs
        SET dependency_count = dependency_count - 1
        WHERE execution_id = $1 AND node_id = ANY($2) AND dependency_count > 0
        "#,
    )
    .bind(execution_id.to_string())
    .bind(&node_ids)
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

/// Fetches all remaining inputs of one execution.
pub async fn fetch_by_execution(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
) -> Result<Vec<ExecutionInput>, sqlx::Error> {
    let rows: Vec<ExecutionInputRow> =
        sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE execution_id = $1"))
            .bind(execution_id.to_string())
            .fetch_all(conn)
            .await?;

    rows.into_iter()
        .map(ExecutionInputRow::try_into_record)
        .collect()
}

/// Deletes rows by id, returning how many went away.
pub async fn delete_by_ids(
    conn: &mut PgConnection,
    ids: &[ExecutionInputId],
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    let result = sqlx::query("DELETE FROM execution_inputs WHERE id = ANY($1)")
        .bind(&ids)
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Deletes all remaining inputs of one execution.
pub async fn delete_by_execution(
    conn: &mut PgConnection,
    execution_id: ExecutionId,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM execution_inputs WHERE execution_id = $1")
        .bind(execution_id.to_string())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

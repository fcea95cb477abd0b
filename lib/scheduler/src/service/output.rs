//! Scheduler service for the output handler.
//!
//! One validated result is processed in one transaction:
//!
//! - SUCCESS: persist the output; if the node has no outgoing edges, the
//!   execution is done — collect and delete both row sets and finalize
//!   COMPLETED; otherwise decrement the dependency counts of the edge
//!   targets.
//! - FAILED: persist the output, synthesize CANCELLED entries for every
//!   still-pending node, collect and delete both row sets and finalize
//!   FAILED.
//!
//! The execution row is locked (`FOR UPDATE`) before any terminal
//! decision; a second finalizer sees a terminal status and no-ops.

use crate::queue::ExecutionResult;
use async_trait::async_trait;
use chrono::Utc;
use miniflow_core::{ExecutionId, ExecutionOutputId};
use miniflow_store::{edges, execution_inputs, execution_outputs, executions};
use miniflow_workflow::error::EngineError;
use miniflow_workflow::execution::{Execution, ExecutionOutput, NodeResult, ResultMap};
use miniflow_workflow::status::{ExecutionStatus, NodeRunStatus};
use sqlx::{PgConnection, PgPool};

/// What processing one result did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The terminal node succeeded; the execution is COMPLETED.
    Completed { execution_id: ExecutionId },
    /// A node failed; the execution is FAILED and the rest was cancelled.
    Failed { execution_id: ExecutionId },
    /// A non-terminal node succeeded; downstream counts were decremented.
    DependenciesUpdated {
        execution_id: ExecutionId,
        updated: u64,
    },
    /// The execution was already terminal; nothing was changed.
    AlreadyTerminal { execution_id: ExecutionId },
}

/// Store-side operations of the output handler.
#[async_trait]
pub trait OutputScheduler: Send + Sync {
    /// Ingests one validated worker result and advances execution state.
    async fn process_result(&self, result: &ExecutionResult)
    -> Result<ProcessOutcome, EngineError>;
}

/// Production output scheduler over PostgreSQL.
pub struct PgOutputScheduler {
    pool: PgPool,
}

impl PgOutputScheduler {
    /// Creates the scheduler.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn handle_success(
        &self,
        tx: &mut PgConnection,
        result: &ExecutionResult,
        execution: &Execution,
    ) -> Result<ProcessOutcome, EngineError> {
        let output = build_output(result, execution);
        execution_outputs::insert(tx, &output)
            .await
            .map_err(EngineError::database)?;

        let outgoing = edges::fetch_from_node(tx, execution.workflow_id, result.node_id)
            .await
            .map_err(EngineError::database)?;

        if outgoing.is_empty() {
            // Terminal node: consolidate and complete.
            let results = collect_outputs(tx, execution.id).await?;
            execution_inputs::delete_by_execution(tx, execution.id)
                .await
                .map_err(EngineError::database)?;
            executions::finalize(
                tx,
                execution.id,
                ExecutionStatus::Completed,
                Utc::now(),
                &results,
            )
            .await
            .map_err(EngineError::database)?;

            tracing::info!(
                execution_id = %execution.id,
                node_id = %result.node_id,
                node_count = results.len(),
                "execution completed"
            );
            return Ok(ProcessOutcome::Completed {
                execution_id: execution.id,
            });
        }

        let targets: Vec<_> = outgoing.iter().map(|edge| edge.to_node_id).collect();
        let updated = execution_inputs::decrement_dependency_counts(tx, execution.id, &targets)
            .await
            .map_err(EngineError::database)?;

        tracing::debug!(
            execution_id = %execution.id,
            node_id = %result.node_id,
            updated_dependencies = updated,
            "node succeeded, downstream unlocked"
        );
        Ok(ProcessOutcome::DependenciesUpdated {
            execution_id: execution.id,
            updated,
        })
    }

    async fn handle_failure(
        &self,
        tx: &mut PgConnection,
        result: &ExecutionResult,
        execution: &Execution,
    ) -> Result<ProcessOutcome, EngineError> {
        let output = build_output(result, execution);
        execution_outputs::insert(tx, &output)
            .await
            .map_err(EngineError::database)?;

        let pending = execution_inputs::fetch_by_execution(tx, execution.id)
            .await
            .map_err(EngineError::database)?;
        execution_inputs::delete_by_execution(tx, execution.id)
            .await
            .map_err(EngineError::database)?;

        let finished = collect_outputs(tx, execution.id).await?;
        let pending_nodes: Vec<_> = pending.iter().map(|input| input.node_id).collect();
        let results = consolidate_failure(&pending_nodes, finished, result.node_id);

        executions::finalize(
            tx,
            execution.id,
            ExecutionStatus::Failed,
            Utc::now(),
            &results,
        )
        .await
        .map_err(EngineError::database)?;

        tracing::warn!(
            execution_id = %execution.id,
            failed_node_id = %result.node_id,
            cancelled_nodes = pending.len(),
            "execution failed"
        );
        Ok(ProcessOutcome::Failed {
            execution_id: execution.id,
        })
    }
}

#[async_trait]
impl OutputScheduler for PgOutputScheduler {
    async fn process_result(
        &self,
        result: &ExecutionResult,
    ) -> Result<ProcessOutcome, EngineError> {
        tracing::info!(
            execution_id = %result.execution_id,
            node_id = %result.node_id,
            status = %result.status,
            "processing execution result"
        );

        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let execution = executions::fetch_by_id_for_update(&mut tx, result.execution_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution", result.execution_id))?;

        if execution.status.is_terminal() {
            tx.rollback().await.map_err(EngineError::database)?;
            tracing::debug!(
                execution_id = %execution.id,
                status = %execution.status,
                "execution already terminal, result ignored"
            );
            return Ok(ProcessOutcome::AlreadyTerminal {
                execution_id: execution.id,
            });
        }

        let outcome = match result.status {
            NodeRunStatus::Success => self.handle_success(&mut tx, result, &execution).await?,
            NodeRunStatus::Failed => self.handle_failure(&mut tx, result, &execution).await?,
            NodeRunStatus::Cancelled => {
                // Validation upstream keeps this unreachable.
                tx.rollback().await.map_err(EngineError::database)?;
                return Err(EngineError::invalid_input(
                    "status",
                    "invalid status 'CANCELLED'. Expected 'SUCCESS' or 'FAILED'",
                ));
            }
        };

        tx.commit().await.map_err(EngineError::database)?;
        Ok(outcome)
    }
}

/// Builds the output row for a worker result.
fn build_output(result: &ExecutionResult, execution: &Execution) -> ExecutionOutput {
    let ended_at = result.ended_at.or_else(|| Some(Utc::now()));
    let duration_seconds = match (result.started_at, ended_at) {
        (Some(started), Some(ended)) => {
            Some((ended - started).num_milliseconds() as f64 / 1000.0)
        }
        _ => None,
    };

    ExecutionOutput {
        id: ExecutionOutputId::new(),
        execution_id: execution.id,
        workspace_id: execution.workspace_id,
        workflow_id: execution.workflow_id,
        node_id: result.node_id,
        status: result.status,
        result_data: result
            .result_data
            .clone()
            .unwrap_or_else(|| serde_json::json!({})),
        started_at: result.started_at,
        ended_at,
        duration_seconds,
        memory_mb: result.memory_mb,
        cpu_percent: result.cpu_percent,
        error_message: result.error_message.clone(),
        error_details: result.error_details.clone(),
        retry_count: result.retry_count,
    }
}

/// Merges finished outputs with synthesized CANCELLED entries for every
/// node that was still waiting. Cancelled entries take precedence; the two
/// sets are disjoint anyway by the at-most-one-in-flight invariant.
fn consolidate_failure(
    pending_nodes: &[miniflow_core::NodeId],
    finished: ResultMap,
    failed_node_id: miniflow_core::NodeId,
) -> ResultMap {
    let mut results = ResultMap::new();
    for node_id in pending_nodes {
        results.insert(*node_id, NodeResult::cancelled_by_failure(failed_node_id));
    }
    for (node_id, node_result) in finished {
        results.entry(node_id).or_insert(node_result);
    }
    results
}

/// Collects every output of the execution into a node-keyed map, then
/// deletes the rows.
async fn collect_outputs(
    tx: &mut PgConnection,
    execution_id: ExecutionId,
) -> Result<ResultMap, EngineError> {
    let outputs = execution_outputs::fetch_by_execution(tx, execution_id)
        .await
        .map_err(EngineError::database)?;

    let mut results = ResultMap::new();
    for output in &outputs {
        results.insert(output.node_id, NodeResult::from_output(output));
    }

    execution_outputs::delete_by_execution(tx, execution_id)
        .await
        .map_err(EngineError::database)?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniflow_core::NodeId;

    #[test]
    fn failure_consolidation_keeps_every_node() {
        // Chain A -> B -> C -> D where B failed: A and B have outputs,
        // C and D were still pending.
        let (a, b, c, d) = (NodeId::new(), NodeId::new(), NodeId::new(), NodeId::new());

        let mut finished = ResultMap::new();
        finished.insert(
            a,
            NodeResult {
                status: NodeRunStatus::Success,
                result_data: Some(serde_json::json!({"ok": true})),
                memory_mb: None,
                cpu_percent: None,
                duration_seconds: None,
                error_message: None,
                error_details: None,
            },
        );
        finished.insert(
            b,
            NodeResult {
                status: NodeRunStatus::Failed,
                result_data: Some(serde_json::json!({})),
                memory_mb: None,
                cpu_percent: None,
                duration_seconds: None,
                error_message: Some("boom".to_string()),
                error_details: None,
            },
        );

        let results = consolidate_failure(&[c, d], finished, b);

        assert_eq!(results.len(), 4);
        assert_eq!(results[&a].status, NodeRunStatus::Success);
        assert_eq!(results[&b].status, NodeRunStatus::Failed);
        assert_eq!(results[&b].error_message.as_deref(), Some("boom"));
        for cancelled in [c, d] {
            assert_eq!(results[&cancelled].status, NodeRunStatus::Cancelled);
            assert!(
                results[&cancelled]
                    .error_message
                    .as_ref()
                    .expect("has message")
                    .contains(&b.to_string())
            );
        }
    }

    #[test]
    fn build_output_defaults_ended_at_and_duration() {
        let execution = Execution::new(
            miniflow_core::WorkspaceId::new(),
            miniflow_core::WorkflowId::new(),
            None,
            serde_json::json!({}),
            None,
        );
        let started = Utc::now() - chrono::Duration::milliseconds(1500);
        let result = ExecutionResult {
            execution_id: execution.id,
            node_id: miniflow_core::NodeId::new(),
            status: NodeRunStatus::Success,
            result_data: None,
            started_at: Some(started),
            ended_at: Some(started + chrono::Duration::milliseconds(1500)),
            memory_mb: Some(128.0),
            cpu_percent: None,
            error_message: None,
            error_details: None,
            retry_count: 2,
        };

        let output = build_output(&result, &execution);
        assert_eq!(output.duration_seconds, Some(1.5));
        assert_eq!(output.retry_count, 2);
        assert_eq!(output.result_data, serde_json::json!({}));

        let without_times = ExecutionResult {
            started_at: None,
            ended_at: None,
            ..result
        };
        let output = build_output(&without_times, &execution);
        assert!(output.ended_at.is_some());
        assert!(output.duration_seconds.is_none());
    }
}

//! Scheduler service for the input handler.
//!
//! Lifecycle per tick:
//! 1. [`InputScheduler::ready_inputs`] selects the ready set and bumps the
//!    wait factor of everything it left behind.
//! 2. [`InputScheduler::build_context`] resolves one input into a task
//!    payload.
//! 3. [`InputScheduler::finish_dispatch`] deletes the dispatched rows and
//!    flips their executions to running.

use crate::queue::TaskPayload;
use async_trait::async_trait;
use miniflow_core::{ExecutionId, ExecutionInputId};
use miniflow_resolver::{ParameterResolver, ResolutionScope, ResolverSource, SecretCipher};
use miniflow_store::{execution_inputs, executions};
use miniflow_workflow::error::EngineError;
use sqlx::PgPool;
use std::sync::Arc;

/// Store-side operations of the input handler.
#[async_trait]
pub trait InputScheduler: Send + Sync {
    /// Atomically selects up to `batch_size` ready inputs and increments
    /// the wait factor of every other ready row.
    async fn ready_inputs(
        &self,
        batch_size: usize,
    ) -> Result<Vec<ExecutionInputId>, EngineError>;

    /// Builds the task payload for one input: loads the row, resolves and
    /// coerces its parameters.
    async fn build_context(&self, input_id: ExecutionInputId) -> Result<TaskPayload, EngineError>;

    /// Deletes dispatched rows and marks their executions running. Called
    /// only after a successful queue submit.
    async fn finish_dispatch(
        &self,
        input_ids: &[ExecutionInputId],
        execution_ids: &[ExecutionId],
    ) -> Result<u64, EngineError>;
}

/// Production input scheduler over PostgreSQL.
pub struct PgInputScheduler {
    pool: PgPool,
    resolver: ParameterResolver,
    source: Arc<dyn ResolverSource>,
    cipher: Arc<dyn SecretCipher>,
}

impl PgInputScheduler {
    /// Creates the scheduler.
    #[must_use]
    pub fn new(
        pool: PgPool,
        resolver: ParameterResolver,
        source: Arc<dyn ResolverSource>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            pool,
            resolver,
            source,
            cipher,
        }
    }
}

#[async_trait]
impl InputScheduler for PgInputScheduler {
    async fn ready_inputs(
        &self,
        batch_size: usize,
    ) -> Result<Vec<ExecutionInputId>, EngineError> {
        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let ready = execution_inputs::fetch_ready(&mut tx, batch_size as i64)
            .await
            .map_err(EngineError::database)?;
        let ids: Vec<ExecutionInputId> = ready.iter().map(|input| input.id).collect();

        if ids.is_empty() {
            tx.commit().await.map_err(EngineError::database)?;
            return Ok(ids);
        }

        let bumped = execution_inputs::increment_wait_factor_except(&mut tx, &ids)
            .await
            .map_err(EngineError::database)?;

        tx.commit().await.map_err(EngineError::database)?;

        tracing::debug!(
            selected = ids.len(),
            wait_factor_bumped = bumped,
            "selected ready execution inputs"
        );
        Ok(ids)
    }

    async fn build_context(&self, input_id: ExecutionInputId) -> Result<TaskPayload, EngineError> {
        tracing::info!(execution_input_id = %input_id, "creating execution context");

        let mut conn = self.pool.acquire().await.map_err(EngineError::database)?;
        let input = execution_inputs::fetch_by_id(&mut conn, input_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution_input", input_id))?;
        drop(conn);

        let scope = ResolutionScope {
            execution_id: input.execution_id,
            workspace_id: input.workspace_id,
        };

        tracing::debug!(
            execution_id = %input.execution_id,
            node_id = %input.node_id,
            param_count = input.params.len(),
            "resolving parameters"
        );

        let params = self
            .resolver
            .resolve_params(
                self.source.as_ref(),
                self.cipher.as_ref(),
                &scope,
                &input.params,
            )
            .await
            .map_err(|e| EngineError::ContextBuild {
                input_id: input_id.to_string(),
                message: e.to_string(),
            })?;

        tracing::info!(
            execution_id = %input.execution_id,
            node_id = %input.node_id,
            resolved_params = params.len(),
            "execution context created"
        );

        Ok(TaskPayload {
            execution_id: input.execution_id,
            node_id: input.node_id,
            workflow_id: input.workflow_id,
            workspace_id: input.workspace_id,
            script_path: input.script_path,
            params: params.into_iter().collect(),
            max_retries: input.max_retries,
            timeout_seconds: input.timeout_seconds,
            process_type: crate::queue::PROCESS_TYPE_IOB.to_string(),
        })
    }

    async fn finish_dispatch(
        &self,
        input_ids: &[ExecutionInputId],
        execution_ids: &[ExecutionId],
    ) -> Result<u64, EngineError> {
        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let deleted = execution_inputs::delete_by_ids(&mut tx, input_ids)
            .await
            .map_err(EngineError::database)?;
        let started = executions::mark_running(&mut tx, execution_ids)
            .await
            .map_err(EngineError::database)?;

        tx.commit().await.map_err(EngineError::database)?;

        tracing::debug!(
            deleted_inputs = deleted,
            executions_started = started,
            "removed dispatched execution inputs"
        );
        Ok(deleted)
    }
}

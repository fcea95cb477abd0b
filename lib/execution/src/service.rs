//! The execution service: start, abort, and read queries.

use crate::launcher::plan_execution_inputs;
use chrono::{DateTime, Utc};
use miniflow_core::{ExecutionId, TriggerId, WorkflowId, WorkspaceId};
use miniflow_store::paths::ScriptRoots;
use miniflow_store::{
    edges, execution_inputs, execution_outputs, executions, nodes, pagination::Page, scripts,
    triggers, workflows,
};
use miniflow_workflow::error::EngineError;
use miniflow_workflow::execution::{Execution, NodeResult, ResultMap};
use miniflow_workflow::node::{ScriptRef, Workflow};
use miniflow_workflow::script::{CustomScript, Script};
use miniflow_workflow::status::ExecutionStatus;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};

/// What a successful start returns.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StartedExecution {
    /// The new execution.
    pub execution_id: ExecutionId,
    /// When it was created.
    pub started_at: DateTime<Utc>,
    /// How many work-items were created (one per node).
    pub input_count: usize,
}

/// What an explicit end returns.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct EndedExecution {
    /// The execution.
    pub execution_id: ExecutionId,
    /// Its (terminal) status after the call.
    pub status: ExecutionStatus,
    /// Wall-clock seconds from start to end, when known.
    pub duration_seconds: Option<f64>,
}

/// Public facade over the execution lifecycle.
pub struct ExecutionService {
    pool: PgPool,
    roots: ScriptRoots,
}

impl ExecutionService {
    /// Creates the service.
    #[must_use]
    pub fn new(pool: PgPool, roots: ScriptRoots) -> Self {
        Self { pool, roots }
    }

    /// Starts an execution through a trigger.
    ///
    /// The payload is validated against the trigger's input mapping before
    /// anything is written.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for a missing trigger or workflow,
    /// `InvalidInput` for a payload violating the mapping, plus the
    /// launcher's planning errors.
    pub async fn start_execution(
        &self,
        trigger_id: TriggerId,
        input_data: JsonValue,
        triggered_by: Option<String>,
    ) -> Result<StartedExecution, EngineError> {
        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let trigger = triggers::fetch_by_id(&mut tx, trigger_id, false)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("trigger", trigger_id))?;
        trigger.validate_input(&input_data)?;

        let workflow = workflows::fetch_by_id(&mut tx, trigger.workflow_id, false)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("workflow", trigger.workflow_id))?;

        let execution = Execution::new(
            trigger.workspace_id,
            workflow.id,
            Some(trigger_id),
            input_data,
            triggered_by,
        );

        let started = self.launch(&mut tx, execution, &workflow).await?;
        tx.commit().await.map_err(EngineError::database)?;
        Ok(started)
    }

    /// Starts an execution directly from a workflow (no trigger).
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for a missing workflow, `InvalidInput` when the
    /// workflow is not in the given workspace, plus the launcher's
    /// planning errors.
    pub async fn start_execution_from_workflow(
        &self,
        workspace_id: WorkspaceId,
        workflow_id: WorkflowId,
        input_data: JsonValue,
        triggered_by: Option<String>,
    ) -> Result<StartedExecution, EngineError> {
        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let workflow = workflows::fetch_by_id(&mut tx, workflow_id, false)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("workflow", workflow_id))?;

        if workflow.workspace_id != workspace_id {
            return Err(EngineError::invalid_input(
                "workflow_id",
                format!("workflow {workflow_id} does not belong to workspace {workspace_id}"),
            ));
        }

        let execution = Execution::new(workspace_id, workflow_id, None, input_data, triggered_by);

        let started = self.launch(&mut tx, execution, &workflow).await?;
        tx.commit().await.map_err(EngineError::database)?;
        Ok(started)
    }

    /// Creates the execution row and its per-node work-items.
    async fn launch(
        &self,
        tx: &mut PgConnection,
        mut execution: Execution,
        workflow: &Workflow,
    ) -> Result<StartedExecution, EngineError> {
        let node_records = nodes::fetch_by_workflow(tx, workflow.id, false)
            .await
            .map_err(EngineError::database)?;
        let edge_records = edges::fetch_by_workflow(tx, workflow.id, false)
            .await
            .map_err(EngineError::database)?;

        // A workflow without nodes has nothing to run.
        if node_records.is_empty() {
            execution.status = ExecutionStatus::Completed;
            execution.ended_at = Some(Utc::now());
            executions::insert(tx, &execution)
                .await
                .map_err(EngineError::database)?;

            tracing::info!(
                execution_id = %execution.id,
                workflow_id = %workflow.id,
                "empty workflow, execution completed immediately"
            );
            return Ok(StartedExecution {
                execution_id: execution.id,
                started_at: execution.started_at,
                input_count: 0,
            });
        }

        let (scripts, custom_scripts) = self.load_scripts(tx, &node_records).await?;
        let inputs = plan_execution_inputs(
            &execution,
            workflow,
            &node_records,
            &edge_records,
            &scripts,
            &custom_scripts,
            &self.roots,
        )?;

        executions::insert(tx, &execution)
            .await
            .map_err(EngineError::database)?;
        for input in &inputs {
            execution_inputs::insert(tx, input)
                .await
                .map_err(EngineError::database)?;
        }

        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            input_count = inputs.len(),
            "execution started"
        );
        Ok(StartedExecution {
            execution_id: execution.id,
            started_at: execution.started_at,
            input_count: inputs.len(),
        })
    }

    /// Bulk-loads the scripts referenced by the nodes, one query per kind.
    async fn load_scripts(
        &self,
        tx: &mut PgConnection,
        node_records: &[miniflow_workflow::node::Node],
    ) -> Result<(Vec<Script>, Vec<CustomScript>), EngineError> {
        let mut script_ids = Vec::new();
        let mut custom_script_ids = Vec::new();
        for node in node_records {
            match node.executable {
                ScriptRef::Global { script_id } => script_ids.push(script_id),
                ScriptRef::Custom { custom_script_id } => custom_script_ids.push(custom_script_id),
            }
        }
        script_ids.sort_unstable();
        script_ids.dedup();
        custom_script_ids.sort_unstable();
        custom_script_ids.dedup();

        let scripts = scripts::fetch_by_ids(tx, &script_ids, false)
            .await
            .map_err(EngineError::database)?;
        let custom_scripts = scripts::fetch_custom_by_ids(tx, &custom_script_ids, false)
            .await
            .map_err(EngineError::database)?;

        Ok((scripts, custom_scripts))
    }

    /// Explicitly ends an execution: remaining nodes become CANCELLED
    /// entries and the given terminal status is written.
    ///
    /// Idempotent: an already-terminal execution is left untouched.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for a missing execution,
    /// `BusinessRuleViolation` when `status` is not terminal.
    pub async fn end_execution(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
    ) -> Result<EndedExecution, EngineError> {
        if !status.is_terminal() {
            return Err(EngineError::BusinessRuleViolation {
                message: format!("cannot end execution with non-terminal status {status}"),
            });
        }

        let mut tx = self.pool.begin().await.map_err(EngineError::database)?;

        let execution = executions::fetch_by_id_for_update(&mut tx, execution_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))?;

        if execution.status.is_terminal() {
            tx.rollback().await.map_err(EngineError::database)?;
            return Ok(EndedExecution {
                execution_id,
                status: execution.status,
                duration_seconds: execution
                    .duration()
                    .map(|d| d.num_milliseconds() as f64 / 1000.0),
            });
        }

        let outputs = execution_outputs::fetch_by_execution(&mut tx, execution_id)
            .await
            .map_err(EngineError::database)?;
        let remaining = execution_inputs::fetch_by_execution(&mut tx, execution_id)
            .await
            .map_err(EngineError::database)?;

        let mut results = ResultMap::new();
        for output in &outputs {
            results.insert(output.node_id, NodeResult::from_output(output));
        }
        for input in &remaining {
            results
                .entry(input.node_id)
                .or_insert_with(NodeResult::cancelled_explicitly);
        }

        execution_inputs::delete_by_execution(&mut tx, execution_id)
            .await
            .map_err(EngineError::database)?;
        execution_outputs::delete_by_execution(&mut tx, execution_id)
            .await
            .map_err(EngineError::database)?;

        let ended_at = Utc::now();
        executions::finalize(&mut tx, execution_id, status, ended_at, &results)
            .await
            .map_err(EngineError::database)?;

        tx.commit().await.map_err(EngineError::database)?;

        tracing::info!(
            execution_id = %execution_id,
            status = %status,
            cancelled_nodes = remaining.len(),
            "execution ended explicitly"
        );
        Ok(EndedExecution {
            execution_id,
            status,
            duration_seconds: Some(
                (ended_at - execution.started_at).num_milliseconds() as f64 / 1000.0,
            ),
        })
    }

    /// Fetches one execution.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` when it does not exist.
    pub async fn get_execution(&self, execution_id: ExecutionId) -> Result<Execution, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(EngineError::database)?;
        executions::fetch_by_id(&mut conn, execution_id)
            .await
            .map_err(EngineError::database)?
            .ok_or_else(|| EngineError::not_found("execution", execution_id))
    }

    /// Lists a workspace's executions with the given status.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    pub async fn list_executions_by_status(
        &self,
        workspace_id: WorkspaceId,
        status: ExecutionStatus,
        page: Page,
    ) -> Result<Vec<Execution>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(EngineError::database)?;
        executions::list_by_workspace_and_status(&mut conn, workspace_id, status, &page)
            .await
            .map_err(EngineError::database)
    }

    /// Lists a workspace's executions regardless of status.
    ///
    /// # Errors
    ///
    /// `Database` on query failure.
    pub async fn list_executions(
        &self,
        workspace_id: WorkspaceId,
        page: Page,
    ) -> Result<Vec<Execution>, EngineError> {
        let mut conn = self.pool.acquire().await.map_err(EngineError::database)?;
        executions::list_by_workspace(&mut conn, workspace_id, &page)
            .await
            .map_err(EngineError::database)
    }

    /// Returns a workspace's most recent executions.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when `limit` is outside `1..=100`.
    pub async fn last_executions(
        &self,
        workspace_id: WorkspaceId,
        limit: u32,
    ) -> Result<Vec<Execution>, EngineError> {
        if !(1..=100).contains(&limit) {
            return Err(EngineError::invalid_input(
                "limit",
                "limit must be between 1 and 100",
            ));
        }

        self.list_executions(workspace_id, Page::new(1, limit, true))
            .await
    }
}

//! The worker-engine queue contract.
//!
//! The engine never runs scripts itself; it hands self-contained task
//! payloads to the worker engine through [`WorkerQueue::put_bulk`] and
//! consumes result payloads through [`WorkerQueue::poll`]. The in-memory
//! implementation backs the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miniflow_core::{ExecutionId, NodeId, WorkflowId, WorkspaceId};
use miniflow_workflow::error::EngineError;
use miniflow_workflow::status::NodeRunStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// The process class tag carried on every task payload. All script nodes
/// are IO-bound from the engine's point of view.
pub const PROCESS_TYPE_IOB: &str = "iob";

fn default_process_type() -> String {
    PROCESS_TYPE_IOB.to_string()
}

/// A self-contained task handed to the worker engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    /// The execution this task belongs to.
    pub execution_id: ExecutionId,
    /// The node to run.
    pub node_id: NodeId,
    /// The workflow the node belongs to.
    pub workflow_id: WorkflowId,
    /// The workspace the execution runs in.
    pub workspace_id: WorkspaceId,
    /// The script to execute.
    pub script_path: String,
    /// Fully resolved, coerced parameters.
    pub params: BTreeMap<String, JsonValue>,
    /// Retry budget for the script.
    pub max_retries: i32,
    /// Wall clock for the script, in seconds.
    pub timeout_seconds: i32,
    /// Process class tag.
    #[serde(default = "default_process_type")]
    pub process_type: String,
}

/// A result payload as it arrives from the worker engine, before
/// validation. Everything is optional here; [`ResultPayload::validate`]
/// narrows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// The execution the result belongs to.
    #[serde(default)]
    pub execution_id: Option<String>,
    /// The node that ran.
    #[serde(default)]
    pub node_id: Option<String>,
    /// `SUCCESS` or `FAILED`.
    #[serde(default)]
    pub status: Option<String>,
    /// The node's return value.
    #[serde(default)]
    pub result_data: Option<JsonValue>,
    /// When the script started.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the script ended.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Peak memory, in megabytes.
    #[serde(default)]
    pub memory_mb: Option<f64>,
    /// Average CPU usage, percent.
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    /// Error message for failed runs.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Structured error details for failed runs.
    #[serde(default)]
    pub error_details: Option<JsonValue>,
    /// Worker-side retry count.
    #[serde(default)]
    pub retry_count: Option<i32>,
    /// Transport-level error slot. A payload carrying only this is not an
    /// execution result at all.
    #[serde(default)]
    pub error: Option<String>,
}

impl ResultPayload {
    /// Returns true when the payload is a bare transport error with no
    /// execution result attached.
    #[must_use]
    pub fn is_error_only(&self) -> bool {
        self.error.is_some()
            && self.execution_id.is_none()
            && self.node_id.is_none()
            && self.status.is_none()
    }

    /// Validates the payload into a typed execution result.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when `execution_id`, `node_id` or `status`
    /// are missing or malformed, or when `status` is neither `SUCCESS` nor
    /// `FAILED`.
    pub fn validate(&self) -> Result<ExecutionResult, EngineError> {
        let execution_id: ExecutionId = self
            .execution_id
            .as_deref()
            .ok_or_else(|| {
                EngineError::invalid_input("execution_id", "execution_id is required in result")
            })?
            .parse()
            .map_err(|e| EngineError::invalid_input("execution_id", format!("{e}")))?;

        let node_id: NodeId = self
            .node_id
            .as_deref()
            .ok_or_else(|| EngineError::invalid_input("node_id", "node_id is required in result"))?
            .parse()
            .map_err(|e| EngineError::invalid_input("node_id", format!("{e}")))?;

        let status = match self.status.as_deref() {
            None => {
                return Err(EngineError::invalid_input(
                    "status",
                    "status is required in result",
                ));
            }
            Some("SUCCESS") => NodeRunStatus::Success,
            Some("FAILED") => NodeRunStatus::Failed,
            Some(other) => {
                return Err(EngineError::invalid_input(
                    "status",
                    format!("invalid status '{other}'. Expected 'SUCCESS' or 'FAILED'"),
                ));
            }
        };

        Ok(ExecutionResult {
            execution_id,
            node_id,
            status,
            result_data: self.result_data.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            memory_mb: self.memory_mb,
            cpu_percent: self.cpu_percent,
            error_message: self.error_message.clone(),
            error_details: self.error_details.clone(),
            retry_count: self.retry_count.unwrap_or(0),
        })
    }
}

/// A validated worker result.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// The execution the result belongs to.
    pub execution_id: ExecutionId,
    /// The node that ran.
    pub node_id: NodeId,
    /// Success or failure; cancellations never come from the engine.
    pub status: NodeRunStatus,
    /// The node's return value.
    pub result_data: Option<JsonValue>,
    /// When the script started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the script ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Peak memory, in megabytes.
    pub memory_mb: Option<f64>,
    /// Average CPU usage, percent.
    pub cpu_percent: Option<f64>,
    /// Error message for failed runs.
    pub error_message: Option<String>,
    /// Structured error details for failed runs.
    pub error_details: Option<JsonValue>,
    /// Worker-side retry count.
    pub retry_count: i32,
}

/// Errors from worker-queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Failed to reach the queue.
    ConnectionFailed { message: String },
    /// Failed to submit a batch.
    SubmitFailed { message: String },
    /// Failed to poll results.
    PollFailed { message: String },
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionFailed { message } => {
                write!(f, "queue connection failed: {message}")
            }
            Self::SubmitFailed { message } => write!(f, "queue submit failed: {message}"),
            Self::PollFailed { message } => write!(f, "queue poll failed: {message}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// The worker-engine queue.
#[async_trait]
pub trait WorkerQueue: Send + Sync {
    /// Submits a batch of task payloads. `Ok(false)` means the engine
    /// rejected the batch as a whole; the caller retries with backoff.
    async fn put_bulk(&self, payloads: &[TaskPayload]) -> Result<bool, QueueError>;

    /// Returns up to `max_items` results, blocking up to `timeout`.
    async fn poll(
        &self,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Vec<ResultPayload>, QueueError>;
}

/// In-memory queue for tests and local development.
///
/// Submitted payloads are recorded; results are staged by the test and
/// drained by `poll`. A failure budget makes the first N submits fail.
#[derive(Default)]
pub struct InMemoryWorkerQueue {
    submitted: Mutex<Vec<TaskPayload>>,
    results: Mutex<VecDeque<ResultPayload>>,
    failing_submits: AtomicUsize,
    reject_submits: AtomicUsize,
}

impl InMemoryWorkerQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` submits return a transport error.
    pub fn fail_next_submits(&self, n: usize) {
        self.failing_submits.store(n, Ordering::SeqCst);
    }

    /// Makes the next `n` submits return `Ok(false)`.
    pub fn reject_next_submits(&self, n: usize) {
        self.reject_submits.store(n, Ordering::SeqCst);
    }

    /// Stages a result for the next poll.
    pub fn push_result(&self, result: ResultPayload) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Returns everything submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<TaskPayload> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerQueue for InMemoryWorkerQueue {
    async fn put_bulk(&self, payloads: &[TaskPayload]) -> Result<bool, QueueError> {
        if self
            .failing_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(QueueError::SubmitFailed {
                message: "injected failure".to_string(),
            });
        }
        if self
            .reject_submits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(false);
        }

        self.submitted.lock().unwrap().extend_from_slice(payloads);
        Ok(true)
    }

    async fn poll(
        &self,
        max_items: usize,
        _timeout: Duration,
    ) -> Result<Vec<ResultPayload>, QueueError> {
        let mut results = self.results.lock().unwrap();
        let take = max_items.min(results.len());
        Ok(results.drain(..take).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> TaskPayload {
        TaskPayload {
            execution_id: ExecutionId::new(),
            node_id: NodeId::new(),
            workflow_id: WorkflowId::new(),
            workspace_id: WorkspaceId::new(),
            script_path: "/scripts/echo.py".to_string(),
            params: BTreeMap::new(),
            max_retries: 3,
            timeout_seconds: 300,
            process_type: PROCESS_TYPE_IOB.to_string(),
        }
    }

    #[test]
    fn task_payload_wire_shape() {
        let task = payload();
        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(json["process_type"], "iob");
        assert!(json["execution_id"].as_str().unwrap().starts_with("EXE-"));
        assert!(json["node_id"].as_str().unwrap().starts_with("NOD-"));
    }

    #[test]
    fn result_validation_requires_identity_and_status() {
        let payload = ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            node_id: Some(NodeId::new().to_string()),
            status: Some("SUCCESS".to_string()),
            result_data: Some(json!({"y": 42})),
            ..Default::default()
        };
        let result = payload.validate().expect("should validate");
        assert_eq!(result.status, NodeRunStatus::Success);
        assert_eq!(result.retry_count, 0);

        let missing_status = ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            node_id: Some(NodeId::new().to_string()),
            ..Default::default()
        };
        assert!(missing_status.validate().is_err());
    }

    #[test]
    fn cancelled_status_is_rejected_from_engine() {
        let payload = ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            node_id: Some(NodeId::new().to_string()),
            status: Some("CANCELLED".to_string()),
            ..Default::default()
        };
        let err = payload.validate().unwrap_err();
        assert!(err.to_string().contains("Expected 'SUCCESS' or 'FAILED'"));
    }

    #[test]
    fn error_only_payloads_are_flagged() {
        let payload = ResultPayload {
            error: Some("thread controller crashed".to_string()),
            ..Default::default()
        };
        assert!(payload.is_error_only());

        let real = ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            error: Some("warning".to_string()),
            ..Default::default()
        };
        assert!(!real.is_error_only());
    }

    #[tokio::test]
    async fn in_memory_queue_round_trip() {
        let queue = InMemoryWorkerQueue::new();
        assert!(queue.put_bulk(&[payload()]).await.expect("submit"));
        assert_eq!(queue.submitted().len(), 1);

        queue.push_result(ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            ..Default::default()
        });
        let results = queue
            .poll(10, Duration::from_millis(10))
            .await
            .expect("poll");
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn failure_budgets_drain() {
        let queue = InMemoryWorkerQueue::new();
        queue.fail_next_submits(1);
        queue.reject_next_submits(1);

        assert!(queue.put_bulk(&[payload()]).await.is_err());
        assert_eq!(queue.put_bulk(&[payload()]).await.expect("submit"), false);
        assert!(queue.put_bulk(&[payload()]).await.expect("submit"));
        assert_eq!(queue.submitted().len(), 1);
    }
}

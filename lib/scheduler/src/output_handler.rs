//! The output handler: ingests worker results and advances executions.
//!
//! Per tick:
//! 1. poll the queue for finished results;
//! 2. validate each result (bad payloads are dropped, never retried);
//! 3. process each on a bounded worker pool, retrying transient failures
//!    with linear backoff. Per-result errors never touch batch peers.

use crate::config::OutputHandlerConfig;
use crate::handler::HandlerHandle;
use crate::polling::AdaptivePolling;
use crate::queue::{ResultPayload, WorkerQueue};
use crate::service::output::OutputScheduler;
use miniflow_workflow::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

/// How long one queue poll may block waiting for results.
const QUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// The output handler loop.
pub struct OutputHandler<S, Q> {
    scheduler: Arc<S>,
    queue: Arc<Q>,
    config: OutputHandlerConfig,
}

impl<S, Q> OutputHandler<S, Q>
where
    S: OutputScheduler + 'static,
    Q: WorkerQueue + 'static,
{
    /// Creates the handler.
    #[must_use]
    pub fn new(scheduler: Arc<S>, queue: Arc<Q>, config: OutputHandlerConfig) -> Self {
        Self {
            scheduler,
            queue,
            config,
        }
    }

    /// Spawns the handler loop and returns its lifecycle handle.
    #[must_use]
    pub fn spawn(self) -> HandlerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        HandlerHandle::new("output", shutdown_tx, task)
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            worker_threads = self.config.worker_threads,
            "output handler started"
        );

        let mut polling = AdaptivePolling::new(
            self.config.min_polling_interval,
            self.config.max_polling_interval,
            self.config.adaptive_polling,
        );

        while !*shutdown.borrow() {
            let sleep = match self.tick().await {
                Ok(true) => {
                    polling.on_tick(false);
                    continue;
                }
                Ok(false) => {
                    polling.on_tick(true);
                    polling.interval()
                }
                Err(e) => {
                    tracing::error!(error = %e, "output handler tick failed");
                    polling.interval()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        tracing::info!("output handler draining");
    }

    /// Runs one poll tick. Returns true when results were pulled.
    async fn tick(&self) -> Result<bool, EngineError> {
        let results = self
            .queue
            .poll(self.config.batch_size, QUEUE_POLL_TIMEOUT)
            .await
            .map_err(|e| EngineError::Database {
                message: e.to_string(),
            })?;

        if results.is_empty() {
            return Ok(false);
        }

        self.process_results(results).await;
        Ok(true)
    }

    /// Processes a batch of results, in parallel when configured.
    async fn process_results(&self, results: Vec<ResultPayload>) {
        if !self.config.parallel_processing {
            for result in results {
                Self::process_single(&*self.scheduler, &self.config, result).await;
            }
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.worker_threads));
        let mut join_set = JoinSet::new();

        for result in results {
            let scheduler = Arc::clone(&self.scheduler);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                Self::process_single(&*scheduler, &config, result).await;
            });
        }

        let drain = async {
            while let Some(joined) = join_set.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "result processing task panicked");
                }
            }
        };

        if tokio::time::timeout(self.config.result_timeout(), drain)
            .await
            .is_err()
        {
            join_set.abort_all();
            tracing::error!("timeout processing results");
        }
    }

    /// Processes one result with retry. Validation failures are dropped
    /// without retrying; transient failures back off linearly.
    async fn process_single(scheduler: &S, config: &OutputHandlerConfig, payload: ResultPayload) {
        if payload.is_error_only() {
            tracing::warn!(
                error = payload.error.as_deref().unwrap_or_default(),
                "skipping error-only result payload"
            );
            return;
        }

        let result = match payload.validate() {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "invalid result payload");
                return;
            }
        };

        let attempts = config.max_retries.max(1);
        for attempt in 1..=attempts {
            match scheduler.process_result(&result).await {
                Ok(outcome) => {
                    tracing::debug!(
                        execution_id = %result.execution_id,
                        node_id = %result.node_id,
                        ?outcome,
                        "result processed"
                    );
                    return;
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(
                        execution_id = %result.execution_id,
                        node_id = %result.node_id,
                        error = %e,
                        "result rejected"
                    );
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        execution_id = %result.execution_id,
                        node_id = %result.node_id,
                        attempt,
                        error = %e,
                        "result processing failed, retrying"
                    );
                    tokio::time::sleep(config.retry_backoff(attempt)).await;
                }
                Err(e) => {
                    // The result is lost unless the engine re-delivers it.
                    let final_error = EngineError::ResultProcessing {
                        execution_id: Some(result.execution_id),
                        node_id: Some(result.node_id),
                        attempts,
                        message: e.to_string(),
                    };
                    tracing::error!(error = %final_error, "result processing exhausted retries");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{ExecutionResult, InMemoryWorkerQueue};
    use crate::service::output::ProcessOutcome;
    use async_trait::async_trait;
    use miniflow_core::{ExecutionId, NodeId};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records processed results; can fail the first N attempts.
    #[derive(Default)]
    struct FakeScheduler {
        processed: Mutex<Vec<ExecutionResult>>,
        transient_failures: AtomicUsize,
        hard_failure: std::sync::atomic::AtomicBool,
    }

    impl FakeScheduler {
        fn processed(&self) -> Vec<ExecutionResult> {
            self.processed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutputScheduler for FakeScheduler {
        async fn process_result(
            &self,
            result: &ExecutionResult,
        ) -> Result<ProcessOutcome, EngineError> {
            if self.hard_failure.load(Ordering::SeqCst) {
                return Err(EngineError::invalid_input("status", "bad"));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EngineError::database("deadlock detected"));
            }

            self.processed.lock().unwrap().push(result.clone());
            Ok(ProcessOutcome::DependenciesUpdated {
                execution_id: result.execution_id,
                updated: 1,
            })
        }
    }

    fn success_payload() -> ResultPayload {
        ResultPayload {
            execution_id: Some(ExecutionId::new().to_string()),
            node_id: Some(NodeId::new().to_string()),
            status: Some("SUCCESS".to_string()),
            result_data: Some(serde_json::json!({"y": 42})),
            ..Default::default()
        }
    }

    fn fast_config() -> OutputHandlerConfig {
        OutputHandlerConfig {
            retry_delay: 0.01,
            ..OutputHandlerConfig::default()
        }
    }

    #[tokio::test]
    async fn processes_polled_results() {
        let scheduler = Arc::new(FakeScheduler::default());
        let queue = Arc::new(InMemoryWorkerQueue::new());
        queue.push_result(success_payload());
        queue.push_result(success_payload());

        let handler = OutputHandler::new(Arc::clone(&scheduler), queue, fast_config());
        let productive = handler.tick().await.expect("tick");

        assert!(productive);
        assert_eq!(scheduler.processed().len(), 2);
    }

    #[tokio::test]
    async fn empty_poll_is_idle() {
        let scheduler = Arc::new(FakeScheduler::default());
        let queue = Arc::new(InMemoryWorkerQueue::new());
        let handler = OutputHandler::new(scheduler, queue, fast_config());

        assert!(!handler.tick().await.expect("tick"));
    }

    #[tokio::test]
    async fn invalid_results_are_dropped_without_retry() {
        let scheduler = Arc::new(FakeScheduler::default());
        let queue = Arc::new(InMemoryWorkerQueue::new());
        queue.push_result(ResultPayload {
            status: Some("SUCCESS".to_string()),
            ..Default::default()
        });
        queue.push_result(ResultPayload {
            error: Some("controller crashed".to_string()),
            ..Default::default()
        });
        queue.push_result(success_payload());

        let handler = OutputHandler::new(Arc::clone(&scheduler), queue, fast_config());
        handler.tick().await.expect("tick");

        // Only the valid payload reached the scheduler.
        assert_eq!(scheduler.processed().len(), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_until_success() {
        let scheduler = Arc::new(FakeScheduler::default());
        scheduler.transient_failures.store(2, Ordering::SeqCst);
        let queue = Arc::new(InMemoryWorkerQueue::new());
        queue.push_result(success_payload());

        let handler = OutputHandler::new(Arc::clone(&scheduler), queue, fast_config());
        handler.tick().await.expect("tick");

        assert_eq!(scheduler.processed().len(), 1);
    }

    #[tokio::test]
    async fn caller_errors_are_not_retried() {
        let scheduler = Arc::new(FakeScheduler::default());
        scheduler.hard_failure.store(true, Ordering::SeqCst);
        let queue = Arc::new(InMemoryWorkerQueue::new());
        queue.push_result(success_payload());

        let handler = OutputHandler::new(Arc::clone(&scheduler), queue, fast_config());
        handler.tick().await.expect("tick");

        assert!(scheduler.processed().is_empty());
    }

    #[tokio::test]
    async fn sequential_processing_mode_works() {
        let scheduler = Arc::new(FakeScheduler::default());
        let queue = Arc::new(InMemoryWorkerQueue::new());
        queue.push_result(success_payload());

        let config = OutputHandlerConfig {
            parallel_processing: false,
            ..fast_config()
        };
        let handler = OutputHandler::new(Arc::clone(&scheduler), queue, config);
        handler.tick().await.expect("tick");

        assert_eq!(scheduler.processed().len(), 1);
    }

    #[tokio::test]
    async fn spawn_and_stop_cleanly() {
        let scheduler = Arc::new(FakeScheduler::default());
        let queue = Arc::new(InMemoryWorkerQueue::new());
        let handler = OutputHandler::new(scheduler, queue, fast_config());

        let handle = handler.spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.stop().await, "handler should drain cleanly");
    }
}

//! The input handler: drives ready work-items to the worker engine.
//!
//! Per tick:
//! 1. select the ready set (the scheduler bumps wait factors atomically);
//! 2. build contexts on a bounded worker pool — a failing input is logged
//!    and skipped, its peers proceed;
//! 3. submit the batch with linear-backoff retries;
//! 4. only after a successful submit, delete the dispatched rows. A failed
//!    submit leaves the rows in place for the next tick, which is what
//!    makes dispatch effectively at-most-once.

use crate::config::InputHandlerConfig;
use crate::handler::HandlerHandle;
use crate::polling::AdaptivePolling;
use crate::queue::{TaskPayload, WorkerQueue};
use crate::service::input::InputScheduler;
use miniflow_core::ExecutionInputId;
use miniflow_workflow::error::EngineError;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

/// The input handler loop.
pub struct InputHandler<S, Q> {
    scheduler: Arc<S>,
    queue: Arc<Q>,
    config: InputHandlerConfig,
}

impl<S, Q> InputHandler<S, Q>
where
    S: InputScheduler + 'static,
    Q: WorkerQueue + 'static,
{
    /// Creates the handler.
    #[must_use]
    pub fn new(scheduler: Arc<S>, queue: Arc<Q>, config: InputHandlerConfig) -> Self {
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
        HandlerHandle::new("input", shutdown_tx, task)
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            batch_size = self.config.batch_size,
            worker_threads = self.config.worker_threads,
            "input handler started"
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
                    // Work was found; poll again immediately.
                    continue;
                }
                Ok(false) => {
                    polling.on_tick(true);
                    polling.interval()
                }
                Err(e) => {
                    // The loop never dies on a tick error.
                    tracing::error!(error = %e, "input handler tick failed");
                    polling.interval()
                }
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(sleep) => {}
            }
        }

        tracing::info!("input handler draining");
    }

    /// Runs one poll tick. Returns true when ready work was found.
    async fn tick(&self) -> Result<bool, EngineError> {
        let ready = self.scheduler.ready_inputs(self.config.batch_size).await?;
        if ready.is_empty() {
            return Ok(false);
        }

        let contexts = self.build_contexts(ready).await;
        if contexts.is_empty() {
            return Ok(true);
        }

        let (input_ids, payloads): (Vec<_>, Vec<_>) = contexts.into_iter().unzip();
        self.submit_with_retries(&payloads).await?;

        // Delete only what was actually submitted; a failure above keeps
        // the rows queued for the next tick.
        let mut execution_ids: Vec<_> = payloads.iter().map(|p| p.execution_id).collect();
        execution_ids.sort_unstable();
        execution_ids.dedup();

        if let Err(e) = self
            .scheduler
            .finish_dispatch(&input_ids, &execution_ids)
            .await
        {
            // The batch is already with the engine; losing the delete only
            // risks a duplicate dispatch, which the engine dedupes.
            tracing::error!(error = %e, "failed to remove dispatched execution inputs");
        }

        Ok(true)
    }

    /// Builds contexts for the batch, in parallel when configured.
    ///
    /// Failures and timeouts drop individual inputs from the batch; they
    /// stay queued and are retried on a later tick.
    async fn build_contexts(
        &self,
        input_ids: Vec<ExecutionInputId>,
    ) -> Vec<(ExecutionInputId, TaskPayload)> {
        if !self.config.parallel_context {
            let mut contexts = Vec::new();
            for input_id in input_ids {
                match self.scheduler.build_context(input_id).await {
                    Ok(payload) if payload.script_path.is_empty() => {
                        tracing::error!(execution_input_id = %input_id, "missing script_path");
                    }
                    Ok(payload) => contexts.push((input_id, payload)),
                    Err(e) => {
                        tracing::error!(execution_input_id = %input_id, error = %e, "context build failed");
                    }
                }
            }
            return contexts;
        }

        let total = input_ids.len();
        let semaphore = Arc::new(Semaphore::new(self.config.worker_threads));
        let mut join_set = JoinSet::new();

        for input_id in input_ids {
            let scheduler = Arc::clone(&self.scheduler);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                // Closed only when the pool is dropped mid-shutdown.
                let Ok(_permit) = semaphore.acquire().await else {
                    return (input_id, Err(EngineError::invalid("worker pool closed")));
                };
                (input_id, scheduler.build_context(input_id).await)
            });
        }

        let mut contexts = Vec::new();
        let collect = async {
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((input_id, Ok(payload))) => {
                        if payload.script_path.is_empty() {
                            tracing::error!(execution_input_id = %input_id, "missing script_path");
                        } else {
                            contexts.push((input_id, payload));
                        }
                    }
                    Ok((input_id, Err(e))) => {
                        tracing::error!(execution_input_id = %input_id, error = %e, "context build failed");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "context build task panicked");
                    }
                }
            }
        };

        if tokio::time::timeout(self.config.context_timeout(), collect)
            .await
            .is_err()
        {
            join_set.abort_all();
            tracing::error!(
                created = contexts.len(),
                requested = total,
                "timeout creating contexts"
            );
        }

        contexts
    }

    /// Submits the batch, retrying with linear backoff.
    async fn submit_with_retries(&self, payloads: &[TaskPayload]) -> Result<(), EngineError> {
        let attempts = self.config.max_retries.max(1);

        for attempt in 1..=attempts {
            let submit = tokio::time::timeout(
                self.config.engine_timeout(),
                self.queue.put_bulk(payloads),
            )
            .await;

            match submit {
                Ok(Ok(true)) => return Ok(()),
                Ok(Ok(false)) => {
                    tracing::warn!(attempt, payloads = payloads.len(), "engine rejected batch");
                }
                Ok(Err(e)) => {
                    tracing::warn!(attempt, error = %e, "engine submit failed");
                }
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        timeout_secs = self.config.engine_timeout,
                        "engine submit timed out"
                    );
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.config.retry_backoff(attempt)).await;
            }
        }

        Err(EngineError::EngineSubmission {
            payload_count: payloads.len(),
            attempts,
        })
    }
}

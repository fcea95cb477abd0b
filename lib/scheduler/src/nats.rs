//! NATS JetStream implementation of the worker queue.
//!
//! Task payloads are published to a work-queue stream the worker engine
//! consumes; results come back on a second work-queue stream this side
//! consumes through a durable pull consumer. Work-queue retention plus
//! explicit acks give each message exactly one successful consumer.

use crate::queue::{QueueError, ResultPayload, TaskPayload, WorkerQueue};
use async_nats::jetstream;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Subject task payloads are published to.
const TASKS_SUBJECT: &str = "miniflow.tasks";

/// Subject result payloads arrive on.
const RESULTS_SUBJECT: &str = "miniflow.results";

/// Stream name for task payloads.
const TASKS_STREAM_NAME: &str = "MINIFLOW_TASKS";

/// Stream name for result payloads.
const RESULTS_STREAM_NAME: &str = "MINIFLOW_RESULTS";

/// Durable name of the result consumer.
const RESULTS_CONSUMER_NAME: &str = "miniflow-output-handler";

/// Queue topology configuration (the `[queue]` INI section).
#[derive(Debug, Clone, Deserialize)]
pub struct QueueTopology {
    /// NATS server URL.
    pub url: String,
    /// Stream name for tasks (defaults to `MINIFLOW_TASKS`).
    #[serde(default)]
    pub tasks_stream_name: Option<String>,
    /// Stream name for results (defaults to `MINIFLOW_RESULTS`).
    #[serde(default)]
    pub results_stream_name: Option<String>,
}

impl QueueTopology {
    /// Creates a topology with default stream names.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tasks_stream_name: None,
            results_stream_name: None,
        }
    }

    fn tasks_stream(&self) -> &str {
        self.tasks_stream_name.as_deref().unwrap_or(TASKS_STREAM_NAME)
    }

    fn results_stream(&self) -> &str {
        self.results_stream_name
            .as_deref()
            .unwrap_or(RESULTS_STREAM_NAME)
    }
}

/// JetStream-backed worker queue.
pub struct NatsWorkerQueue {
    jetstream: jetstream::Context,
    results_consumer: jetstream::consumer::PullConsumer,
}

impl NatsWorkerQueue {
    /// Connects and ensures both streams and the result consumer exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection or stream/consumer setup
    /// fails.
    pub async fn connect(topology: &QueueTopology) -> Result<Self, QueueError> {
        let client = async_nats::connect(&topology.url).await.map_err(|e| {
            QueueError::ConnectionFailed {
                message: e.to_string(),
            }
        })?;

        let jetstream = jetstream::new(client);

        Self::ensure_stream(&jetstream, topology.tasks_stream(), TASKS_SUBJECT).await?;
        let results_stream =
            Self::ensure_stream(&jetstream, topology.results_stream(), RESULTS_SUBJECT).await?;

        let results_consumer = results_stream
            .get_or_create_consumer(
                RESULTS_CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(RESULTS_CONSUMER_NAME.to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to create result consumer: {e}"),
            })?;

        Ok(Self {
            jetstream,
            results_consumer,
        })
    }

    async fn ensure_stream(
        jetstream: &jetstream::Context,
        name: &str,
        subject: &str,
    ) -> Result<jetstream::stream::Stream, QueueError> {
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: name.to_string(),
                subjects: vec![subject.to_string()],
                storage: jetstream::stream::StorageType::File,
                retention: jetstream::stream::RetentionPolicy::WorkQueue,
                ..Default::default()
            })
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to create stream {name}: {e}"),
            })
    }
}

#[async_trait]
impl WorkerQueue for NatsWorkerQueue {
    async fn put_bulk(&self, payloads: &[TaskPayload]) -> Result<bool, QueueError> {
        for payload in payloads {
            let bytes = serde_json::to_vec(payload).map_err(|e| QueueError::SubmitFailed {
                message: format!("failed to serialize task payload: {e}"),
            })?;

            self.jetstream
                .publish(TASKS_SUBJECT, bytes.into())
                .await
                .map_err(|e| QueueError::SubmitFailed {
                    message: e.to_string(),
                })?
                .await
                .map_err(|e| QueueError::SubmitFailed {
                    message: e.to_string(),
                })?;
        }

        Ok(true)
    }

    async fn poll(
        &self,
        max_items: usize,
        timeout: Duration,
    ) -> Result<Vec<ResultPayload>, QueueError> {
        use futures::StreamExt;

        let mut messages =
            self.results_consumer
                .messages()
                .await
                .map_err(|e| QueueError::PollFailed {
                    message: format!("failed to open result stream: {e}"),
                })?;

        let mut results = Vec::new();
        while results.len() < max_items {
            let message = match tokio::time::timeout(timeout, messages.next()).await {
                Ok(Some(Ok(message))) => message,
                Ok(Some(Err(e))) => {
                    return Err(QueueError::PollFailed {
                        message: e.to_string(),
                    });
                }
                // Stream closed or nothing arrived within the window.
                Ok(None) | Err(_) => break,
            };

            match serde_json::from_slice::<ResultPayload>(&message.payload) {
                Ok(result) => results.push(result),
                Err(e) => {
                    // A malformed payload would otherwise redeliver
                    // forever; ack and drop it.
                    tracing::error!(error = %e, "dropping malformed result payload");
                }
            }

            message.ack().await.map_err(|e| QueueError::PollFailed {
                message: format!("failed to ack result: {e}"),
            })?;
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_defaults() {
        let topology = QueueTopology::new("nats://localhost:4222");
        assert_eq!(topology.tasks_stream(), TASKS_STREAM_NAME);
        assert_eq!(topology.results_stream(), RESULTS_STREAM_NAME);
    }

    #[test]
    fn topology_custom_names() {
        let topology = QueueTopology {
            url: "nats://localhost:4222".to_string(),
            tasks_stream_name: Some("CUSTOM_TASKS".to_string()),
            results_stream_name: Some("CUSTOM_RESULTS".to_string()),
        };
        assert_eq!(topology.tasks_stream(), "CUSTOM_TASKS");
        assert_eq!(topology.results_stream(), "CUSTOM_RESULTS");
    }
}

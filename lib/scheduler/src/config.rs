//! Handler configuration.
//!
//! Both handler configs deserialize from their INI sections
//! (`[input_handler]`, `[output_handler]`); every key has a default so an
//! empty section is valid. Intervals are plain seconds, so `0.1` in the
//! INI means 100ms.

use serde::Deserialize;
use std::time::Duration;

/// Configuration of the input handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputHandlerConfig {
    /// Maximum ready rows selected per tick.
    pub batch_size: usize,
    /// Bound on concurrent context builds.
    pub worker_threads: usize,
    /// Submit attempts before a batch is abandoned for this tick.
    pub max_retries: u32,
    /// Wall clock for one tick's context building, in seconds.
    pub context_timeout: f64,
    /// Wall clock for one queue submit attempt, in seconds.
    pub engine_timeout: f64,
    /// Fastest polling interval, in seconds.
    pub min_polling_interval: f64,
    /// Slowest polling interval, in seconds.
    pub max_polling_interval: f64,
    /// Base delay between submit attempts, in seconds (linear backoff).
    pub retry_delay: f64,
    /// Whether the polling interval adapts to load.
    pub adaptive_polling: bool,
    /// Whether contexts build concurrently.
    pub parallel_context: bool,
}

impl Default for InputHandlerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            worker_threads: 4,
            max_retries: 3,
            context_timeout: 30.0,
            engine_timeout: 60.0,
            min_polling_interval: 0.1,
            max_polling_interval: 5.0,
            retry_delay: 1.0,
            adaptive_polling: true,
            parallel_context: true,
        }
    }
}

impl InputHandlerConfig {
    /// The context-build wall clock as a duration.
    #[must_use]
    pub fn context_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.context_timeout)
    }

    /// The per-submit wall clock as a duration.
    #[must_use]
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.engine_timeout)
    }

    /// The backoff before the given retry attempt (1-based).
    #[must_use]
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.retry_delay * f64::from(attempt))
    }
}

/// Configuration of the output handler.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputHandlerConfig {
    /// Maximum results pulled from the queue per tick.
    pub batch_size: usize,
    /// Bound on concurrent result processing.
    pub worker_threads: usize,
    /// Ingestion attempts per result.
    pub max_retries: u32,
    /// Wall clock for one tick's result processing, in seconds.
    pub result_timeout: f64,
    /// Fastest polling interval, in seconds.
    pub min_polling_interval: f64,
    /// Slowest polling interval, in seconds.
    pub max_polling_interval: f64,
    /// Base delay between ingestion attempts, in seconds (linear backoff).
    pub retry_delay: f64,
    /// Whether the polling interval adapts to load.
    pub adaptive_polling: bool,
    /// Whether results process concurrently.
    pub parallel_processing: bool,
}

impl Default for OutputHandlerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            worker_threads: 4,
            max_retries: 3,
            result_timeout: 60.0,
            min_polling_interval: 0.1,
            max_polling_interval: 5.0,
            retry_delay: 1.0,
            adaptive_polling: true,
            parallel_processing: true,
        }
    }
}

impl OutputHandlerConfig {
    /// The result-processing wall clock as a duration.
    #[must_use]
    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.result_timeout)
    }

    /// The backoff before the given retry attempt (1-based).
    #[must_use]
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.retry_delay * f64::from(attempt))
    }
}

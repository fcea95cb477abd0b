//! Adaptive polling interval.
//!
//! Handlers poll a shared resource (database or queue). When nothing is
//! ready the interval stretches by 1.2x per idle tick up to the configured
//! maximum; as soon as a tick finds work it tightens by 0.8x down to the
//! minimum. This keeps idle load low without hurting burst latency.

use std::time::Duration;

/// Adaptive interval state for one handler loop.
#[derive(Debug, Clone)]
pub struct AdaptivePolling {
    current_secs: f64,
    min_secs: f64,
    max_secs: f64,
    enabled: bool,
}

impl AdaptivePolling {
    /// Growth factor applied after an idle tick.
    const BACKOFF_FACTOR: f64 = 1.2;

    /// Shrink factor applied after a productive tick.
    const TIGHTEN_FACTOR: f64 = 0.8;

    /// Creates an interval starting at the minimum.
    #[must_use]
    pub fn new(min_secs: f64, max_secs: f64, enabled: bool) -> Self {
        Self {
            current_secs: min_secs,
            min_secs,
            max_secs,
            enabled,
        }
    }

    /// Records the outcome of a tick and adjusts the interval.
    pub fn on_tick(&mut self, idle: bool) {
        if !self.enabled {
            return;
        }

        self.current_secs = if idle {
            (self.current_secs * Self::BACKOFF_FACTOR).min(self.max_secs)
        } else {
            (self.current_secs * Self::TIGHTEN_FACTOR).max(self.min_secs)
        };
    }

    /// The current sleep interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.current_secs)
    }

    /// The current interval in seconds, for logging.
    #[must_use]
    pub fn interval_secs(&self) -> f64 {
        self.current_secs
    }
}

//! Shared handler lifecycle plumbing.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long a stopping handler may spend draining in-flight work before it
/// is aborted.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Handle to a running handler loop.
///
/// Dropping the handle does not stop the loop; call [`HandlerHandle::stop`]
/// for a cooperative shutdown.
pub struct HandlerHandle {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HandlerHandle {
    pub(crate) fn new(
        name: &'static str,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            name,
            shutdown,
            task,
        }
    }

    /// Signals shutdown and waits for the loop to drain.
    ///
    /// Returns true for a clean join; false when the grace period expired
    /// and the loop was aborted.
    pub async fn stop(self) -> bool {
        let _ = self.shutdown.send(true);

        let mut task = self.task;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(_) => {
                tracing::info!(handler = self.name, "handler stopped");
                true
            }
            Err(_) => {
                tracing::warn!(
                    handler = self.name,
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "handler did not drain within grace period, aborting"
                );
                task.abort();
                false
            }
        }
    }
}

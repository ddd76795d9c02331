//! Cancelable delayed work.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A future that runs after a delay unless the handle is cancelled or dropped
/// first.
///
/// Owners keep the handle for as long as the scheduled effect is still
/// wanted, so tearing the owner down also tears down its timers.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `task` to run once `delay` has elapsed.
    pub fn after<F>(delay: Duration, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let deadline = tokio::time::Instant::now() + delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });
        Self { handle }
    }

    /// Stop the task if it has not run yet.
    pub fn cancel(self) {
        drop(self);
    }

    /// Whether the task has run (or been cancelled).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

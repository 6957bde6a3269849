//! Cancellable background task handle.
//!
//! Wraps a spawned tokio task so owners can cancel it or await its result.
//! Loops inside use `tokio::time`, so tests drive them with a paused clock.

use std::future::Future;

use tokio::task::JoinHandle;

/// Handle to a spawned task producing `T`.
#[derive(Debug)]
pub struct ScheduledTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> ScheduledTask<T> {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Stop the task at its next suspension point. Idempotent.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the output. `None` if the task was cancelled or panicked.
    pub async fn join(self) -> Option<T> {
        match self.handle.await {
            Ok(output) => Some(output),
            Err(err) => {
                if err.is_panic() {
                    tracing::error!(error = %err, "scheduled task panicked");
                }
                None
            }
        }
    }
}

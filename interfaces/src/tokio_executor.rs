//! Tokio Blocking-Pool Executor
//!
//! Runs tasks on the tokio runtime's blocking thread pool. The number of
//! tasks in flight is capped with a semaphore; a task that cannot get a
//! permit immediately is rejected.

use crate::executor::{Task, TaskExecutor};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::trace;

/// Executor backed by `tokio::task::spawn_blocking`
pub struct TokioExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl TokioExecutor {
    /// Create an executor on the given runtime admitting `max_in_flight` tasks
    pub fn new(handle: Handle, max_in_flight: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    /// Create an executor on the runtime of the calling context
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current(max_in_flight: usize) -> Self {
        Self::new(Handle::current(), max_in_flight)
    }

    /// Number of tasks that can still be admitted
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl TaskExecutor for TokioExecutor {
    fn execute(&self, task: Task) -> bool {
        let Ok(permit) = self.permits.clone().try_acquire_owned() else {
            trace!("Tokio executor at capacity, task rejected");
            return false;
        };

        self.handle.spawn_blocking(move || {
            task();
            drop(permit);
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runs_tasks_on_blocking_pool() {
        let executor = TokioExecutor::current(4);
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..4 {
            let tx = tx.clone();
            assert!(executor.execute(Box::new(move || {
                tx.send(i).unwrap();
            })));
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(value) = rx.recv().await {
            received.push(value);
        }
        received.sort_unstable();
        assert_eq!(received, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_rejects_over_capacity() {
        let executor = TokioExecutor::current(1);
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        assert!(executor.execute(Box::new(move || {
            let _ = release_rx.recv();
        })));
        assert!(!executor.execute(Box::new(|| {})));

        release_tx.send(()).unwrap();
    }
}

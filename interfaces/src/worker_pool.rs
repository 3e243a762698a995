//! Worker Pool Executor
//!
//! Fixed set of pre-spawned worker threads fed through a bounded queue. A
//! full queue rejects the task instead of blocking the submitter.

use crate::{executor::{Task, TaskExecutor}, InterfaceError};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace};

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Thread name prefix
    pub name: String,
    /// Number of worker threads
    pub nof_threads: usize,
    /// Maximum number of queued tasks
    pub queue_size: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            name: "phy_dl".to_string(),
            nof_threads: 4,
            queue_size: 128,
        }
    }
}

/// Submission statistics
#[derive(Debug, Default)]
struct ExecutorStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

/// Executor running tasks on a pool of worker threads
pub struct WorkerPoolExecutor {
    name: String,
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<ExecutorStats>,
}

impl WorkerPoolExecutor {
    /// Spawn the worker threads
    pub fn new(config: WorkerPoolConfig) -> Result<Self, InterfaceError> {
        if config.nof_threads == 0 {
            return Err(InterfaceError::InvalidConfig(
                "Worker pool needs at least one thread".to_string(),
            ));
        }
        if config.queue_size == 0 {
            return Err(InterfaceError::InvalidConfig(
                "Worker pool queue size must be non-zero".to_string(),
            ));
        }

        let (sender, receiver) = channel::bounded::<Task>(config.queue_size);

        let mut workers = Vec::with_capacity(config.nof_threads);
        for id in 0..config.nof_threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("{}#{}", config.name, id))
                .spawn(move || Self::run_loop(id, receiver))?;
            workers.push(handle);
        }

        info!(
            "Started worker pool '{}' with {} threads and queue size {}",
            config.name, config.nof_threads, config.queue_size
        );

        Ok(Self {
            name: config.name,
            sender: Some(sender),
            workers,
            stats: Arc::new(ExecutorStats::default()),
        })
    }

    /// Worker main loop: runs tasks until the queue is closed and drained
    fn run_loop(id: usize, receiver: Receiver<Task>) {
        debug!("Worker {} running", id);
        for task in receiver.iter() {
            task();
        }
        debug!("Worker {} exiting", id);
    }

    /// Number of worker threads
    pub fn nof_threads(&self) -> usize {
        self.workers.len()
    }

    /// Number of (accepted, rejected) submissions so far
    pub fn submission_counts(&self) -> (u64, u64) {
        (
            self.stats.accepted.load(Ordering::Relaxed),
            self.stats.rejected.load(Ordering::Relaxed),
        )
    }

    /// Close the queue and wait for the workers to drain it
    pub fn stop(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        info!("Worker pool '{}' stopped", self.name);
    }
}

impl TaskExecutor for WorkerPoolExecutor {
    fn execute(&self, task: Task) -> bool {
        let Some(sender) = self.sender.as_ref() else {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        match sender.try_send(task) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                trace!("Worker pool '{}' rejected a task", self.name);
                false
            }
        }
    }
}

impl Drop for WorkerPoolExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::{Duration, Instant};

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::Acquire) != expected {
            assert!(Instant::now() < deadline, "Timed out waiting for tasks");
            thread::yield_now();
        }
    }

    #[test]
    fn test_runs_accepted_tasks() {
        let executor = WorkerPoolExecutor::new(WorkerPoolConfig {
            name: "test".to_string(),
            nof_threads: 2,
            queue_size: 16,
        })
        .unwrap();

        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let runs = runs.clone();
            assert!(executor.execute(Box::new(move || {
                runs.fetch_add(1, Ordering::AcqRel);
            })));
        }

        wait_for(&runs, 10);
        assert_eq!(executor.submission_counts(), (10, 0));
    }

    #[test]
    fn test_rejects_when_queue_full() {
        let executor = WorkerPoolExecutor::new(WorkerPoolConfig {
            name: "test".to_string(),
            nof_threads: 1,
            queue_size: 1,
        })
        .unwrap();

        // Park the only worker so the queue cannot drain.
        let gate = Arc::new(Barrier::new(2));
        let started = Arc::new(AtomicUsize::new(0));
        {
            let gate = gate.clone();
            let started = started.clone();
            assert!(executor.execute(Box::new(move || {
                started.fetch_add(1, Ordering::AcqRel);
                gate.wait();
            })));
        }
        wait_for(&started, 1);

        assert!(executor.execute(Box::new(|| {})));
        assert!(!executor.execute(Box::new(|| {})));

        gate.wait();
        assert_eq!(executor.submission_counts(), (2, 1));
    }

    #[test]
    fn test_stopped_executor_rejects() {
        let mut executor = WorkerPoolExecutor::new(WorkerPoolConfig::default()).unwrap();
        executor.stop();
        assert!(!executor.execute(Box::new(|| {})));
    }

    #[test]
    fn test_invalid_config() {
        let config = WorkerPoolConfig {
            nof_threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            WorkerPoolExecutor::new(config),
            Err(InterfaceError::InvalidConfig(_))
        ));
    }
}

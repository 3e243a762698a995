//! Task Executor Interface
//!
//! Submitting work never blocks: an executor either accepts the task and
//! runs it on one of its threads, or rejects it and the submitter runs the
//! work itself. Rejection is the back-pressure signal.

use tracing::trace;

/// Unit of work handed to an executor
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Non-blocking task submission
pub trait TaskExecutor: Send + Sync {
    /// Submit a task for asynchronous execution
    ///
    /// Returns `true` if the task will run asynchronously. Returns `false` if
    /// it was rejected; the task is dropped without running and the caller
    /// must perform the work synchronously.
    fn execute(&self, task: Task) -> bool;
}

/// Executor that rejects every task, forcing synchronous execution
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn execute(&self, _task: Task) -> bool {
        trace!("Inline executor: task rejected, caller runs it");
        false
    }
}

//! Execution Interfaces Library
//!
//! This crate provides the task-execution interfaces consumed by the
//! physical layer: a non-blocking task submission trait and its executors.

pub mod executor;
pub mod tokio_executor;
pub mod worker_pool;

pub use executor::{InlineExecutor, Task, TaskExecutor};
pub use tokio_executor::TokioExecutor;
pub use worker_pool::{WorkerPoolConfig, WorkerPoolExecutor};

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Worker thread spawn failed: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("Executor stopped")]
    Stopped,
}

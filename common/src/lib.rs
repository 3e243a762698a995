//! Common Utilities and Types Library
//!
//! This crate provides shared types, utilities and lock-free building blocks
//! used across the downlink pipeline.

pub mod counter;
pub mod pool;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use counter::AtomicCounter;
pub use pool::{PoolGuard, ProcessorPool};
pub use types::*;
pub use utils::*;

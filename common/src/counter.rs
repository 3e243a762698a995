//! Lock-free fan-in counter
//!
//! A task group is tracked by a counter preset to the number of members.
//! Every member decrements it once when done and exactly one of them, the
//! one that observes the transition to zero, owns the completion actions.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown of outstanding units of work
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicUsize,
}

impl AtomicCounter {
    /// Create a counter preset to `value`
    pub fn new(value: usize) -> Self {
        Self {
            value: AtomicUsize::new(value),
        }
    }

    /// Preset the counter. Only valid while no member is running.
    pub fn set(&self, value: usize) {
        self.value.store(value, Ordering::Release);
    }

    /// Current value
    pub fn get(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    /// Decrement the counter and report whether this call brought it to zero
    ///
    /// AcqRel makes every write done by the other members before their own
    /// decrement visible to the member that observes zero.
    #[inline]
    pub fn decrement_and_check_zero(&self) -> bool {
        let previous = self.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous != 0, "Counter decremented below zero");
        previous == 1
    }
}

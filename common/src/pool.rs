//! Fixed-capacity pool of reusable processing units
//!
//! Every item is created once up front and parked in a lock-free bounded
//! queue. A task pops an item for the duration of its work and owns it; the
//! guard pushes it back when dropped.

use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use tracing::warn;

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Pool of `T` instances handed out one task at a time
pub struct ProcessorPool<T> {
    items: ArrayQueue<T>,
    factory: Factory<T>,
}

impl<T> ProcessorPool<T> {
    /// Create a pool of `capacity` items built by `factory`
    pub fn new(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        assert!(capacity > 0, "Processor pool capacity must be non-zero");

        let items = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            // Cannot overflow, the queue was sized for exactly this many items
            let _ = items.push(factory());
        }

        Self {
            items,
            factory: Box::new(factory),
        }
    }

    /// Number of items in the pool
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Try to acquire a free item without waiting
    pub fn try_acquire(&self) -> Option<PoolGuard<'_, T>> {
        self.items.pop().map(|item| PoolGuard {
            pool: self,
            item: Some(item),
        })
    }

    /// Acquire an item, never waiting
    ///
    /// Users size the pool for their maximum concurrency. When it is exhausted
    /// anyway, a surplus item is built for this caller and dropped on release
    /// if the pool is full again by then.
    pub fn acquire(&self) -> PoolGuard<'_, T> {
        if let Some(guard) = self.try_acquire() {
            return guard;
        }

        warn!("Processor pool of {} items exhausted, building a surplus item", self.capacity());
        PoolGuard {
            pool: self,
            item: Some((self.factory)()),
        }
    }
}

/// Exclusive handle to one pool item
pub struct PoolGuard<'a, T> {
    pool: &'a ProcessorPool<T>,
    item: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in drop
        match &self.item {
            Some(item) => item,
            None => unreachable!("pool item already released"),
        }
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.item {
            Some(item) => item,
            None => unreachable!("pool item already released"),
        }
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            // A full queue means this was a surplus item
            let _ = self.pool.items.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn numbered_pool(capacity: usize) -> ProcessorPool<usize> {
        let next = AtomicUsize::new(0);
        ProcessorPool::new(capacity, move || next.fetch_add(1, Ordering::Relaxed))
    }

    #[test]
    fn test_exclusive_acquisition() {
        let pool = numbered_pool(2);

        let first = pool.try_acquire().unwrap();
        let second = pool.try_acquire().unwrap();
        assert_ne!(*first, *second);
        assert!(pool.try_acquire().is_none());

        drop(first);
        assert!(pool.try_acquire().is_some());
    }

    #[test]
    fn test_items_are_reused() {
        let pool = ProcessorPool::new(1, Vec::<u8>::new);
        pool.acquire().push(7);
        pool.acquire().push(9);
        assert_eq!(*pool.acquire(), vec![7, 9]);
    }

    #[test]
    fn test_exhausted_acquire_does_not_block() {
        let pool = Arc::new(numbered_pool(1));
        let held = pool.acquire();
        assert_eq!(*held, 0);

        let (sender, receiver) = mpsc::channel();
        let worker = {
            let pool = pool.clone();
            thread::spawn(move || {
                let surplus = pool.acquire();
                sender.send(*surplus).unwrap();
            })
        };

        // The holder keeps its item while the second caller gets a fresh one
        let surplus = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(surplus, 1);
        worker.join().unwrap();

        drop(held);
        assert_eq!(pool.items.len(), 1);
        assert_eq!(*pool.try_acquire().unwrap(), 0);
    }

    #[test]
    fn test_surplus_items_do_not_grow_the_pool() {
        let pool = numbered_pool(2);
        let guards: Vec<_> = (0..5).map(|_| pool.acquire()).collect();
        let mut values: Vec<usize> = guards.iter().map(|g| **g).collect();
        values.sort_unstable();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);

        drop(guards);
        assert_eq!(pool.items.len(), pool.capacity());
    }

    #[test]
    fn test_concurrent_holders_never_alias() {
        let pool = Arc::new(ProcessorPool::new(4, || 0u64));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let mut item = pool.acquire();
                        let before = *item;
                        *item += 1;
                        assert_eq!(*item, before + 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let guards: Vec<_> = (0..4).map(|_| pool.try_acquire().unwrap()).collect();
        let total: u64 = guards.iter().map(|item| **item).sum();
        assert_eq!(total, 4000);
    }
}

//! Bounded background task queue
//!
//! Producers on the response path never wait: `dispatch` always succeeds,
//! and when the queue is full the oldest pending task is dropped to make
//! room. Tasks are consumed by a spawned worker through [`recv`] or drained
//! inline with [`drain`].
//!
//! [`recv`]: BackgroundDispatcher::recv
//! [`drain`]: BackgroundDispatcher::drain

use crate::config::DispatchConfig;
use crate::utils::sync::lock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Result of dispatching a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Queued,
    /// Queued after dropping the oldest pending task
    DroppedOldest,
    /// The dispatcher is closed; the task was discarded
    Closed,
}

/// Snapshot of dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub pending: usize,
    pub dispatched: u64,
    pub dropped: u64,
}

/// Drop-oldest queue of deferred work
pub struct BackgroundDispatcher<T> {
    capacity: usize,
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl<T> BackgroundDispatcher<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::new(config.queue_capacity)
    }

    /// Enqueue a task without blocking
    pub fn dispatch(&self, task: T) -> DispatchOutcome {
        if self.closed.load(Ordering::Acquire) {
            debug!("Dispatcher closed, discarding task");
            return DispatchOutcome::Closed;
        }

        let outcome = {
            let mut queue = lock(&self.queue);
            let outcome = if queue.len() >= self.capacity {
                queue.pop_front();
                DispatchOutcome::DroppedOldest
            } else {
                DispatchOutcome::Queued
            };
            queue.push_back(task);
            outcome
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if outcome == DispatchOutcome::DroppedOldest {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                "Background queue full (capacity {}), dropped oldest task ({} dropped total)",
                self.capacity, dropped
            );
        }
        self.notify.notify_one();
        outcome
    }

    pub fn try_pop(&self) -> Option<T> {
        lock(&self.queue).pop_front()
    }

    /// Take every pending task in dispatch order
    pub fn drain(&self) -> Vec<T> {
        lock(&self.queue).drain(..).collect()
    }

    /// Wait for the next task; `None` once closed and empty
    pub async fn recv(&self) -> Option<T> {
        loop {
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting tasks; pending tasks can still be received
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            pending: self.len(),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_dispatch_and_drain_in_order() {
        let dispatcher = BackgroundDispatcher::new(8);
        for i in 0..3 {
            assert_eq!(dispatcher.dispatch(i), DispatchOutcome::Queued);
        }
        assert_eq!(dispatcher.drain(), vec![0, 1, 2]);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let dispatcher = BackgroundDispatcher::new(2);
        dispatcher.dispatch("a");
        dispatcher.dispatch("b");
        assert_eq!(dispatcher.dispatch("c"), DispatchOutcome::DroppedOldest);

        assert_eq!(dispatcher.drain(), vec!["b", "c"]);
        let stats = dispatcher.stats();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.dispatched, 3);
    }

    #[test]
    fn test_closed_dispatcher_discards() {
        let dispatcher = BackgroundDispatcher::new(2);
        dispatcher.dispatch(1);
        dispatcher.close();
        assert_eq!(dispatcher.dispatch(2), DispatchOutcome::Closed);
        assert_eq!(dispatcher.drain(), vec![1]);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_dispatch() {
        let dispatcher = Arc::new(BackgroundDispatcher::new(4));
        let consumer = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.dispatch(42);

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, Some(42));
    }

    #[tokio::test]
    async fn test_recv_ends_after_close() {
        let dispatcher: BackgroundDispatcher<u8> = BackgroundDispatcher::new(4);
        dispatcher.dispatch(7);
        dispatcher.close();
        assert_eq!(dispatcher.recv().await, Some(7));
        assert_eq!(dispatcher.recv().await, None);
    }
}

//! The bounded, closeable FIFO queue that decouples submission from
//! network I/O (§4.1), generalized into the single abstraction reused for
//! both the producer's input queue and the consumer's output queue.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Outcome of a non-blocking write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Full,
    Closed,
}

/// The capability a producer/consumer needs from its internal queue (§9:
/// "the producer is generic over the queue implementation"). `take_one` /
/// `try_take_one` / `wait_empty` / `len` are not named by §4.1 directly but
/// are the natural extension needed to reuse this same abstraction for the
/// consumer's single-record read API and back-pressure point (§4.9, §4.10).
#[async_trait]
pub trait BoundedQueue<T: Send + 'static>: Send + Sync {
    /// Non-blocking write. `Closed`/`Full` do not return the item — callers
    /// that need the rejected value back should inspect it before calling.
    fn try_write(&self, item: T) -> WriteOutcome;

    /// Blocks until at least one item is available or `timeout` elapses,
    /// then drains up to `max_count` items without further waiting. Returns
    /// remaining items on close even if the timeout has not elapsed.
    async fn take_batch(&self, max_count: usize, timeout: Duration) -> Vec<T>;

    /// Blocks until one item is available; `None` only once closed-and-empty.
    async fn take_one(&self) -> Option<T>;

    /// Non-blocking single-item dequeue.
    fn try_take_one(&self) -> Option<T>;

    /// Resolves once the queue is empty (or closed). Used as the consumer
    /// pull loop's back-pressure point.
    async fn wait_empty(&self);

    fn close(&self);

    fn is_closed_and_empty(&self) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Default in-memory implementation of [`BoundedQueue`]: a `VecDeque`
/// guarded by a `parking_lot::Mutex`, with `tokio::sync::Notify` used to
/// wake waiters without polling.
pub struct InMemoryQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    item_added: Notify,
    drained: Notify,
}

impl<T> InMemoryQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            capacity,
            item_added: Notify::new(),
            drained: Notify::new(),
        }
    }
}

impl<T> Default for InMemoryQueue<T> {
    fn default() -> Self {
        Self::with_capacity(crate::types::DEFAULT_QUEUE_BOUNDS)
    }
}

#[async_trait]
impl<T: Send + 'static> BoundedQueue<T> for InMemoryQueue<T> {
    fn try_write(&self, item: T) -> WriteOutcome {
        let mut guard = self.inner.lock();
        if guard.closed {
            return WriteOutcome::Closed;
        }
        if guard.items.len() >= self.capacity {
            return WriteOutcome::Full;
        }
        guard.items.push_back(item);
        drop(guard);
        self.item_added.notify_one();
        WriteOutcome::Written
    }

    async fn take_batch(&self, max_count: usize, timeout: Duration) -> Vec<T> {
        let start = Instant::now();
        loop {
            let notified = self.item_added.notified();
            {
                let mut guard = self.inner.lock();
                if !guard.items.is_empty() {
                    let n = max_count.min(guard.items.len());
                    let batch: Vec<T> = guard.items.drain(..n).collect();
                    let now_empty = guard.items.is_empty();
                    drop(guard);
                    if now_empty {
                        self.drained.notify_waiters();
                    }
                    return batch;
                }
                if guard.closed {
                    return Vec::new();
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                // Timeout elapsed with nothing to drain; one last
                // non-blocking check in case of a race with a writer.
                let mut guard = self.inner.lock();
                let n = max_count.min(guard.items.len());
                let batch: Vec<T> = guard.items.drain(..n).collect();
                return batch;
            }

            let remaining = timeout - elapsed;
            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }

    async fn take_one(&self) -> Option<T> {
        loop {
            let notified = self.item_added.notified();
            {
                let mut guard = self.inner.lock();
                if let Some(item) = guard.items.pop_front() {
                    let now_empty = guard.items.is_empty();
                    drop(guard);
                    if now_empty {
                        self.drained.notify_waiters();
                    }
                    return Some(item);
                }
                if guard.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn try_take_one(&self) -> Option<T> {
        let mut guard = self.inner.lock();
        let item = guard.items.pop_front();
        let now_empty = guard.items.is_empty();
        drop(guard);
        if item.is_some() && now_empty {
            self.drained.notify_waiters();
        }
        item
    }

    async fn wait_empty(&self) {
        loop {
            let notified = self.drained.notified();
            {
                let guard = self.inner.lock();
                if guard.items.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    fn close(&self) {
        let mut guard = self.inner.lock();
        guard.closed = true;
        drop(guard);
        self.item_added.notify_waiters();
        self.drained.notify_waiters();
    }

    fn is_closed_and_empty(&self) -> bool {
        let guard = self.inner.lock();
        guard.closed && guard.items.is_empty()
    }

    fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Testable Property 3: a queue never holds more than its configured
        // capacity, regardless of the sequence of writes attempted.
        #[test]
        fn never_exceeds_capacity(capacity in 1usize..20, writes in 0usize..50) {
            let q: InMemoryQueue<usize> = InMemoryQueue::with_capacity(capacity);
            let mut accepted = 0;
            for i in 0..writes {
                if q.try_write(i) == WriteOutcome::Written {
                    accepted += 1;
                }
            }
            prop_assert!(accepted <= capacity);
            prop_assert_eq!(q.len(), accepted.min(capacity));
            prop_assert!(q.len() <= capacity);
        }
    }
}

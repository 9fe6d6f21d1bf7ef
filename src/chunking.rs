//! Converts a stream of single messages into right-sized batches (§4.3).

use std::sync::Arc;

use crate::queue::BoundedQueue;
use crate::types::ChunkingPolicy;

/// A lazy reader that emits batches from a [`BoundedQueue`], sized by count
/// or elapsed time per its [`ChunkingPolicy`].
///
/// Invariants: never emits an empty batch; every enqueued item is emitted
/// exactly once unless the queue is torn down without being drained.
pub struct ChunkedReader<Q> {
    queue: Arc<Q>,
    policy: ChunkingPolicy,
}

impl<Q> ChunkedReader<Q> {
    pub fn new(queue: Arc<Q>, policy: ChunkingPolicy) -> Self {
        Self { queue, policy }
    }
}

impl<Q> ChunkedReader<Q> {
    /// Returns the next batch, or `None` once the queue is closed and
    /// drained.
    pub async fn next_batch<T>(&self) -> Option<Vec<T>>
    where
        T: Send + 'static,
        Q: BoundedQueue<T>,
    {
        loop {
            let batch = self
                .queue
                .take_batch(self.policy.max_chunk_size, self.policy.min_chunking_interval)
                .await;
            if !batch.is_empty() {
                return Some(batch);
            }
            if self.queue.is_closed_and_empty() {
                return None;
            }
            // Timeout elapsed with nothing available; loop and wait again.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;
    use std::time::Duration;

    #[tokio::test]
    async fn never_emits_an_empty_batch_and_stops_on_close() {
        let queue = Arc::new(InMemoryQueue::<u32>::with_capacity(10));
        let policy = ChunkingPolicy {
            max_chunk_size: 4,
            min_chunking_interval: Duration::from_millis(20),
        };
        let reader = ChunkedReader::new(queue.clone(), policy);

        queue.try_write(1);
        queue.try_write(2);
        let batch = reader.next_batch::<u32>().await.unwrap();
        assert_eq!(batch, vec![1, 2]);

        queue.close();
        assert_eq!(reader.next_batch::<u32>().await, None);
    }

    #[tokio::test]
    async fn caps_batch_size_at_max_chunk_size() {
        let queue = Arc::new(InMemoryQueue::<u32>::with_capacity(10));
        for i in 0..6 {
            queue.try_write(i);
        }
        let policy = ChunkingPolicy {
            max_chunk_size: 4,
            min_chunking_interval: Duration::from_millis(20),
        };
        let reader = ChunkedReader::new(queue, policy);
        let batch = reader.next_batch::<u32>().await.unwrap();
        assert_eq!(batch.len(), 4);
    }
}

//! Consumer core: shard carousel, resharding loop, pull loop, and the
//! read API that drains delivered records (§4.8-§4.10).

mod pull;
mod read;
mod reshard;

pub use pull::replenish_messages;
pub use read::{consumer_source, consumer_stream_state, read_consumer, try_read_consumer};
pub use reshard::update_stream_state;

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::carousel::Carousel;
use crate::error::ConsumerError;
use crate::queue::{BoundedQueue, InMemoryQueue};
use crate::transport::RecordData;
use crate::types::{ConsumerKit, SavedStreamState, ShardState};

/// A record paired with the shard state it came from, as carried through
/// the consumer's output queue. Pairing is what lets `read_consumer` update
/// the correct shard's `lastSequenceNumber` without a second lookup (§4.9).
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub shard: Arc<ShardState>,
    pub record: RecordData,
}

/// Shared carousel handle: the resharding loop appends to it, the pull loop
/// reads the current shard and advances it, and `consumer_stream_state`
/// reads it for a snapshot. One mutex guards the whole structure; no
/// operation here ever holds it across a `runRequest` call (§5, Testable
/// Property 7).
pub type SharedCarousel = Arc<Mutex<Carousel<Arc<ShardState>>>>;

/// Handle passed to the caller's `inner` closure by [`with_consumer`].
/// Cloning shares the same output queue and carousel; any number of tasks
/// may call the read API concurrently (§5).
pub struct Consumer<Q> {
    queue: Arc<Q>,
    carousel: SharedCarousel,
}

impl<Q> Clone for Consumer<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            carousel: self.carousel.clone(),
        }
    }
}

impl<Q: BoundedQueue<ConsumerRecord>> Consumer<Q> {
    /// Dequeue one record, blocking until one is available (§4.10).
    pub async fn read(&self) -> Option<ConsumerRecord> {
        read_consumer(&*self.queue).await
    }

    /// Non-blocking dequeue; `None` if the output queue is currently empty.
    pub fn try_read(&self) -> Option<ConsumerRecord> {
        try_read_consumer(&*self.queue)
    }

    /// A lazy, infinite stream of records produced by repeated [`Self::read`].
    pub fn source(&self) -> impl futures::Stream<Item = ConsumerRecord> + '_ {
        consumer_source(&*self.queue)
    }

    /// Snapshot of `shardId -> lastSequenceNumber` for every shard that has
    /// had at least one record read, suitable for persisting and resuming
    /// later via [`ConsumerKit::saved_stream_state`].
    pub fn stream_state(&self) -> SavedStreamState {
        consumer_stream_state(&self.carousel)
    }

    /// Number of records currently buffered awaiting a reader.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }
}

/// Construct a consumer backed by the default in-memory queue, spawn its
/// resharding and pull background tasks, run `inner(consumer)`, and abort
/// the background tasks once it completes.
pub async fn with_consumer<F, Fut, R>(kit: ConsumerKit, inner: F) -> Result<R, ConsumerError>
where
    F: FnOnce(Consumer<InMemoryQueue<ConsumerRecord>>) -> Fut,
    Fut: Future<Output = R>,
{
    let queue = Arc::new(InMemoryQueue::with_capacity(kit.queue_bounds));
    with_consumer_with_queue(kit, queue, inner).await
}

/// Generic form of [`with_consumer`] over any [`BoundedQueue`] implementation.
pub async fn with_consumer_with_queue<Q, F, Fut, R>(
    kit: ConsumerKit,
    queue: Arc<Q>,
    inner: F,
) -> Result<R, ConsumerError>
where
    Q: BoundedQueue<ConsumerRecord> + 'static,
    F: FnOnce(Consumer<Q>) -> Fut,
    Fut: Future<Output = R>,
{
    if kit.batch_size == 0 {
        return Err(ConsumerError::InvalidConfig(
            "batch_size must be >= 1".to_string(),
        ));
    }

    let kit = Arc::new(kit);
    let carousel: SharedCarousel = Arc::new(Mutex::new(Carousel::new()));

    let consumer = Consumer {
        queue: queue.clone(),
        carousel: carousel.clone(),
    };

    let reshard_handle = tokio::spawn(reshard::reshard_loop(carousel.clone(), kit.clone()));
    let pull_handle = tokio::spawn(pull::pull_loop(queue, carousel, kit));

    let result = inner(consumer).await;

    // Background loops are cancelled when the managing scope exits (§5).
    reshard_handle.abort();
    pull_handle.abort();

    Ok(result)
}

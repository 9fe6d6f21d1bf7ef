//! Core data model: messages, policies, shard state, and opaque tokens.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::ProducerError;
use crate::transport::StreamTransport;

/// Maximum message length, in characters, enforced by the producer.
pub const MAX_MESSAGE_SIZE: usize = 51_000;

/// Default `BatchPolicy::batch_size` / `ConsumerKit::batch_size`.
pub const DEFAULT_BATCH_SIZE: usize = 200;
/// Default `RetryPolicy::retry_count`.
pub const DEFAULT_RETRY_COUNT: u32 = 5;
/// Default `ProducerKit::queue_bounds` / `ConsumerKit::queue_bounds`.
pub const DEFAULT_QUEUE_BOUNDS: usize = 10_000;
/// Default `ProducerKit::max_concurrency`.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
/// Default bound on producer worker respawns after an unhandled panic.
pub const DEFAULT_MAX_WORKER_RESPAWNS: u32 = 8;

pub const CHUNK_COMMIT_INTERVAL: Duration = Duration::from_secs(5);
pub const DISPATCH_EXCEPTION_BACKOFF: Duration = Duration::from_secs(5);
pub const RESHARD_SUCCESS_INTERVAL: Duration = Duration::from_secs(10);
pub const RESHARD_FAILURE_INTERVAL: Duration = Duration::from_secs(3);
pub const PULL_IDLE_INTERVAL: Duration = Duration::from_secs(5);
pub const PULL_ACTIVE_INTERVAL: Duration = Duration::from_millis(70);
pub const PULL_FAILURE_INTERVAL: Duration = Duration::from_secs(2);

/// Opaque, UTF-8 message payload accepted by the producer.
pub type Message = String;

/// A producer-internal queue entry: a message awaiting dispatch, its
/// partition key, and its remaining retry budget.
#[derive(Debug, Clone)]
pub struct MessageQueueItem {
    pub payload: Message,
    pub partition_key: String,
    pub remaining_attempts: u32,
}

impl MessageQueueItem {
    /// An item is eligible for dispatch while at least one attempt remains.
    pub fn is_eligible(&self) -> bool {
        self.remaining_attempts >= 1
    }

    /// Consume one attempt. Saturates at zero rather than panicking.
    pub fn decrement(&mut self) {
        self.remaining_attempts = self.remaining_attempts.saturating_sub(1);
    }
}

/// Which dispatch endpoint the producer's dispatch sink uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// One `PutRecord` call per item.
    Single,
    /// Batched `PutRecords` calls, `batch_size` items per call.
    #[default]
    Batch,
}

/// Batching configuration for the producer's dispatch sink.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    /// Honored only when `endpoint == Endpoint::Batch`.
    pub batch_size: usize,
    pub endpoint: Endpoint,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            endpoint: Endpoint::Batch,
        }
    }
}

/// Retry budget configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub retry_count: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
        }
    }
}

/// Derived chunking policy: how the chunked reader decides a batch is ready.
#[derive(Debug, Clone)]
pub struct ChunkingPolicy {
    pub max_chunk_size: usize,
    pub min_chunking_interval: Duration,
}

impl ChunkingPolicy {
    /// Derive from a `BatchPolicy` and the producer's `max_concurrency`,
    /// per §3: `maxChunkSize = batchPolicy.batchSize * maxConcurrency`.
    pub fn derive(batch_policy: &BatchPolicy, max_concurrency: usize) -> Self {
        Self {
            max_chunk_size: batch_policy.batch_size.saturating_mul(max_concurrency).max(1),
            min_chunking_interval: CHUNK_COMMIT_INTERVAL,
        }
    }
}

/// Callback invoked on fatal or recoverable producer errors for visibility
/// beyond the silent-drop-on-exhaustion default (§7).
pub type ErrorCallback = Arc<dyn Fn(&ProducerError) + Send + Sync>;

/// Construction-time producer configuration. Immutable once a producer is
/// built from it.
#[derive(Clone)]
pub struct ProducerKit {
    pub stream_name: String,
    pub transport: Arc<dyn StreamTransport>,
    pub batch_policy: BatchPolicy,
    pub retry_policy: RetryPolicy,
    pub queue_bounds: usize,
    pub max_concurrency: usize,
    pub cleanup_timeout: Option<Duration>,
    pub max_worker_respawns: u32,
    pub on_error: Option<ErrorCallback>,
}

/// Builder for [`ProducerKit`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct ProducerKitBuilder {
    stream_name: String,
    transport: Arc<dyn StreamTransport>,
    batch_policy: BatchPolicy,
    retry_policy: RetryPolicy,
    queue_bounds: usize,
    max_concurrency: usize,
    cleanup_timeout: Option<Duration>,
    max_worker_respawns: u32,
    on_error: Option<ErrorCallback>,
}

impl ProducerKitBuilder {
    pub fn new(stream_name: impl Into<String>, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            stream_name: stream_name.into(),
            transport,
            batch_policy: BatchPolicy::default(),
            retry_policy: RetryPolicy::default(),
            queue_bounds: DEFAULT_QUEUE_BOUNDS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            cleanup_timeout: None,
            max_worker_respawns: DEFAULT_MAX_WORKER_RESPAWNS,
            on_error: None,
        }
    }

    pub fn batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.batch_policy = policy;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn queue_bounds(mut self, bounds: usize) -> Self {
        self.queue_bounds = bounds;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    pub fn max_worker_respawns(mut self, n: u32) -> Self {
        self.max_worker_respawns = n;
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProducerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ProducerKit {
        ProducerKit {
            stream_name: self.stream_name,
            transport: self.transport,
            batch_policy: self.batch_policy,
            retry_policy: self.retry_policy,
            queue_bounds: self.queue_bounds,
            max_concurrency: self.max_concurrency,
            cleanup_timeout: self.cleanup_timeout,
            max_worker_respawns: self.max_worker_respawns,
            on_error: self.on_error,
        }
    }
}

/// An opaque shard iterator token, as returned by `GetShardIterator` /
/// `GetRecords`. Never parsed or interpreted by the core.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShardIterator(pub String);

impl fmt::Display for ShardIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque, lexicographically sortable sequence number.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub String);

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of the shard a freshly-discovered shard's iterator starts at,
/// when no saved sequence number is available for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IteratorType {
    #[default]
    Latest,
    TrimHorizon,
    AtSequenceNumber,
    AfterSequenceNumber,
}

/// Per-shard mutable state: the shard id (identity, for carousel dedup),
/// the current shard iterator, and the last sequence number read from it.
///
/// Two `ShardState`s are equal iff their `shard_id` matches — this powers
/// `Carousel::nub()` deduplication.
pub struct ShardState {
    pub shard_id: String,
    iterator: Mutex<Option<ShardIterator>>,
    last_sequence_number: Mutex<Option<SequenceNumber>>,
}

impl ShardState {
    pub fn new(shard_id: impl Into<String>, iterator: Option<ShardIterator>) -> Self {
        Self {
            shard_id: shard_id.into(),
            iterator: Mutex::new(iterator),
            last_sequence_number: Mutex::new(None),
        }
    }

    pub fn iterator(&self) -> Option<ShardIterator> {
        self.iterator.lock().clone()
    }

    pub fn set_iterator(&self, iterator: Option<ShardIterator>) {
        *self.iterator.lock() = iterator;
    }

    pub fn last_sequence_number(&self) -> Option<SequenceNumber> {
        self.last_sequence_number.lock().clone()
    }

    pub fn set_last_sequence_number(&self, sequence_number: Option<SequenceNumber>) {
        *self.last_sequence_number.lock() = sequence_number;
    }
}

impl fmt::Debug for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardState")
            .field("shard_id", &self.shard_id)
            .field("iterator", &self.iterator.lock())
            .field("last_sequence_number", &self.last_sequence_number.lock())
            .finish()
    }
}

impl PartialEq for ShardState {
    fn eq(&self, other: &Self) -> bool {
        self.shard_id == other.shard_id
    }
}

impl Eq for ShardState {}

/// Construction-time consumer configuration.
#[derive(Clone)]
pub struct ConsumerKit {
    pub stream_name: String,
    pub transport: Arc<dyn StreamTransport>,
    /// Iterator type used for shards with no entry in `saved_stream_state`.
    pub iterator_type: IteratorType,
    /// `GetRecords` limit per pull.
    pub batch_size: usize,
    pub queue_bounds: usize,
    pub saved_stream_state: Option<SavedStreamState>,
}

/// Builder for [`ConsumerKit`].
#[must_use = "builders do nothing unless you call .build()"]
pub struct ConsumerKitBuilder {
    stream_name: String,
    transport: Arc<dyn StreamTransport>,
    iterator_type: IteratorType,
    batch_size: usize,
    queue_bounds: usize,
    saved_stream_state: Option<SavedStreamState>,
}

impl ConsumerKitBuilder {
    pub fn new(stream_name: impl Into<String>, transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            stream_name: stream_name.into(),
            transport,
            iterator_type: IteratorType::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            queue_bounds: DEFAULT_QUEUE_BOUNDS,
            saved_stream_state: None,
        }
    }

    pub fn iterator_type(mut self, iterator_type: IteratorType) -> Self {
        self.iterator_type = iterator_type;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn queue_bounds(mut self, bounds: usize) -> Self {
        self.queue_bounds = bounds;
        self
    }

    pub fn saved_stream_state(mut self, state: SavedStreamState) -> Self {
        self.saved_stream_state = Some(state);
        self
    }

    pub fn build(self) -> ConsumerKit {
        ConsumerKit {
            stream_name: self.stream_name,
            transport: self.transport,
            iterator_type: self.iterator_type,
            batch_size: self.batch_size,
            queue_bounds: self.queue_bounds,
            saved_stream_state: self.saved_stream_state,
        }
    }
}

/// A `shardId -> sequenceNumber` snapshot, suitable for persisting and
/// resuming a consumer later.
#[derive(Clone, Debug, Default)]
pub struct SavedStreamState(pub HashMap<String, SequenceNumber>);

impl SavedStreamState {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, shard_id: &str) -> Option<&SequenceNumber> {
        self.0.get(shard_id)
    }

    pub fn insert(&mut self, shard_id: impl Into<String>, sequence_number: SequenceNumber) {
        self.0.insert(shard_id.into(), sequence_number);
    }
}

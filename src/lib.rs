//! Kinesis Stream Core
//!
//! A client library core that reliably ingests and delivers records to a
//! cloud-managed, shard-partitioned log stream (modeled after Amazon
//! Kinesis). Two symmetric subsystems: a [`Producer`] that buffers messages
//! and dispatches them in batches with retries, and a consumer that
//! continuously pulls records from the stream's open shards, round-robining
//! between them.
//!
//! The Stream Service SDK itself (request signing, HTTP transport),
//! credential/config loading, and any CLI wrapper are external
//! collaborators out of scope for this crate — see [`StreamTransport`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kinesis_stream_core::{producer, ProducerKitBuilder};
//! # use kinesis_stream_core::transport::MockTransport;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = Arc::new(MockTransport::new());
//! let kit = ProducerKitBuilder::new("my-stream", transport).build();
//!
//! let result = producer::with_producer(kit, |p| async move {
//!     p.write("hello".to_string()).unwrap();
//! })
//! .await;
//! # let _ = result;
//! # }
//! ```

pub mod carousel;
pub mod chunking;
pub mod concurrency;
pub mod consumer;
pub mod error;
pub mod producer;
pub mod queue;
pub mod retry;
pub mod transport;
pub mod types;

pub use carousel::Carousel;
pub use consumer::{with_consumer, with_consumer_with_queue, Consumer, ConsumerRecord, SharedCarousel};
pub use error::{ConsumerError, ProducerError, ProducerWriteError, TransportError};
pub use producer::{with_producer, with_producer_with_queue, Producer};
pub use queue::{BoundedQueue, InMemoryQueue, WriteOutcome};
pub use transport::StreamTransport;
pub use types::{
    BatchPolicy, ChunkingPolicy, ConsumerKit, ConsumerKitBuilder, Endpoint, IteratorType, Message,
    MessageQueueItem, ProducerKit, ProducerKitBuilder, RetryPolicy, SavedStreamState,
    SequenceNumber, ShardIterator, ShardState, MAX_MESSAGE_SIZE,
};

//! Producer core: the enqueue API and the worker/caller lifecycle that
//! drives dispatch (§4.5-§4.7).

mod dispatch;
mod lifecycle;

pub use lifecycle::{with_producer, with_producer_with_queue};

use std::sync::Arc;

use rand::Rng;

use crate::error::ProducerWriteError;
use crate::queue::{BoundedQueue, WriteOutcome};
use crate::types::{Message, MessageQueueItem, MAX_MESSAGE_SIZE};

const PARTITION_KEY_LEN: usize = 25;
const PARTITION_KEY_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Handle passed to the caller's `inner` closure by [`with_producer`]. Safe
/// to clone and share across tasks; `write_producer` is thread-safe (§5).
pub struct Producer<Q> {
    pub(crate) queue: Arc<Q>,
    pub(crate) retry_count: u32,
}

impl<Q> Clone for Producer<Q> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            retry_count: self.retry_count,
        }
    }
}

impl<Q: BoundedQueue<MessageQueueItem>> Producer<Q> {
    /// Enqueue a message for dispatch (§4.7).
    ///
    /// Fails fast with [`ProducerWriteError::MessageTooLarge`] without
    /// touching the queue; otherwise generates a random partition key and
    /// performs a non-blocking write, mapping the queue's outcome to a
    /// returned error rather than raising one.
    pub fn write(&self, message: Message) -> Result<(), ProducerWriteError> {
        if message.chars().count() > MAX_MESSAGE_SIZE {
            return Err(ProducerWriteError::MessageTooLarge {
                len: message.chars().count(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let item = MessageQueueItem {
            payload: message,
            partition_key: random_partition_key(),
            remaining_attempts: self.retry_count + 1,
        };

        match self.queue.try_write(item) {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::Full => Err(ProducerWriteError::QueueFull),
            WriteOutcome::Closed => Err(ProducerWriteError::QueueClosed),
        }
    }

    /// Number of items currently buffered awaiting dispatch.
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Serialize `value` as a JSON message and enqueue it, per the
    /// template's `Producer::append_json` convenience method. Unlike the
    /// template (which silently drops serialization failures), this
    /// surfaces them as [`ProducerWriteError::SerializationFailed`] to stay
    /// consistent with this crate's non-silent `write` surface.
    pub fn write_json<T: serde::Serialize>(&self, value: &T) -> Result<(), ProducerWriteError> {
        let payload = serde_json::to_string(value)
            .map_err(|err| ProducerWriteError::SerializationFailed(err.to_string()))?;
        self.write(payload)
    }
}

/// Random 25-character lowercase-ASCII partition key (§4.7, §9: "a
/// cryptographically unnecessary PRNG" is sufficient).
fn random_partition_key() -> String {
    let mut rng = rand::thread_rng();
    (0..PARTITION_KEY_LEN)
        .map(|_| PARTITION_KEY_ALPHABET[rng.gen_range(0..PARTITION_KEY_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_partition_key_is_25_lowercase_ascii_chars() {
        let key = random_partition_key();
        assert_eq!(key.len(), 25);
        assert!(key.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn write_json_serializes_then_enqueues_as_a_message() {
        use crate::queue::InMemoryQueue;
        use std::sync::Arc;

        #[derive(serde::Serialize)]
        struct Event {
            id: u32,
            name: String,
        }

        let queue = Arc::new(InMemoryQueue::<MessageQueueItem>::with_capacity(10));
        let producer = Producer {
            queue: queue.clone(),
            retry_count: 5,
        };

        producer
            .write_json(&Event {
                id: 7,
                name: "order-placed".to_string(),
            })
            .unwrap();

        let item = queue.try_take_one().unwrap();
        assert_eq!(item.payload, r#"{"id":7,"name":"order-placed"}"#);
    }
}

//! Single-record read, non-blocking try-read, and the lazy record stream
//! (§4.10).

use futures::stream::{self, Stream};

use super::{ConsumerRecord, SharedCarousel};
use crate::queue::BoundedQueue;
use crate::types::SavedStreamState;

/// Dequeue one record, updating its shard's `lastSequenceNumber`. Blocks
/// until a record is available; resolves to `None` only once the output
/// queue is closed and drained.
pub async fn read_consumer<Q: BoundedQueue<ConsumerRecord>>(queue: &Q) -> Option<ConsumerRecord> {
    let item = queue.take_one().await?;
    item.shard
        .set_last_sequence_number(Some(item.record.sequence_number.clone()));
    Some(item)
}

/// Non-blocking form of [`read_consumer`]; `None` if the queue is currently
/// empty (whether or not it is closed).
pub fn try_read_consumer<Q: BoundedQueue<ConsumerRecord>>(queue: &Q) -> Option<ConsumerRecord> {
    let item = queue.try_take_one()?;
    item.shard
        .set_last_sequence_number(Some(item.record.sequence_number.clone()));
    Some(item)
}

/// A lazy, infinite stream of records produced by repeated [`read_consumer`]
/// calls. Not restartable in the sense of replaying past records — calling
/// it again only resumes draining the same live queue.
pub fn consumer_source<Q>(queue: &Q) -> impl Stream<Item = ConsumerRecord> + '_
where
    Q: BoundedQueue<ConsumerRecord>,
{
    stream::unfold(queue, |queue| async move {
        read_consumer(queue).await.map(|item| (item, queue))
    })
}

/// Snapshot of `shardId -> lastSequenceNumber` for every shard that has had
/// at least one record read, suitable for persisting as a
/// [`SavedStreamState`] and resuming a later consumer (§4.10, §3).
pub fn consumer_stream_state(carousel: &SharedCarousel) -> SavedStreamState {
    let mut state = SavedStreamState::new();
    for shard in carousel.lock().list() {
        if let Some(seq) = shard.last_sequence_number() {
            state.insert(shard.shard_id.clone(), seq);
        }
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryQueue;
    use crate::transport::RecordData;
    use crate::types::{SequenceNumber, ShardState};
    use futures::StreamExt;
    use std::sync::Arc;

    fn record(shard_id: &str, seq: &str) -> ConsumerRecord {
        ConsumerRecord {
            shard: Arc::new(ShardState::new(shard_id, None)),
            record: RecordData {
                sequence_number: SequenceNumber(seq.to_string()),
                partition_key: "pk".to_string(),
                data: "payload".into(),
            },
        }
    }

    #[tokio::test]
    async fn read_consumer_updates_the_shards_last_sequence_number() {
        let queue: InMemoryQueue<ConsumerRecord> = InMemoryQueue::with_capacity(10);
        let item = record("shard-0", "42");
        let shard = item.shard.clone();
        queue.try_write(item);

        let out = read_consumer(&queue).await.unwrap();
        assert_eq!(out.record.sequence_number, SequenceNumber("42".to_string()));
        assert_eq!(shard.last_sequence_number(), Some(SequenceNumber("42".to_string())));
    }

    #[test]
    fn try_read_consumer_is_none_on_an_empty_queue() {
        let queue: InMemoryQueue<ConsumerRecord> = InMemoryQueue::with_capacity(10);
        assert!(try_read_consumer(&queue).is_none());
    }

    #[tokio::test]
    async fn consumer_source_drains_every_written_record_in_order() {
        let queue: InMemoryQueue<ConsumerRecord> = InMemoryQueue::with_capacity(10);
        queue.try_write(record("shard-0", "1"));
        queue.try_write(record("shard-0", "2"));
        queue.close();

        let out: Vec<_> = consumer_source(&queue)
            .map(|r| r.record.sequence_number)
            .collect()
            .await;
        assert_eq!(
            out,
            vec![SequenceNumber("1".to_string()), SequenceNumber("2".to_string())]
        );
    }
}

//! Periodic shard discovery and carousel reconciliation (§4.8).

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::TransportError;
use crate::transport::GetShardIteratorRequest;
use crate::types::{ConsumerKit, ShardState, RESHARD_FAILURE_INTERVAL, RESHARD_SUCCESS_INTERVAL};

use super::SharedCarousel;

/// Discover open shards not already present in the carousel, request a
/// shard iterator for each (resuming from `saved_stream_state` when the
/// shard has a saved sequence number), and append the resulting
/// [`ShardState`]s into the carousel (deduplicating via `nub`).
pub async fn update_stream_state(
    carousel: &SharedCarousel,
    kit: &ConsumerKit,
) -> Result<(), TransportError> {
    let open_shards = kit.transport.list_shards(&kit.stream_name).await?;

    let known: HashSet<String> = carousel
        .lock()
        .list()
        .iter()
        .map(|s| s.shard_id.clone())
        .collect();

    let mut new_states = Vec::new();
    for shard in open_shards {
        if known.contains(&shard.shard_id) {
            continue;
        }

        let saved = kit
            .saved_stream_state
            .as_ref()
            .and_then(|s| s.get(&shard.shard_id));

        let request = GetShardIteratorRequest {
            stream_name: kit.stream_name.clone(),
            shard_id: shard.shard_id.clone(),
            iterator_type: if saved.is_some() {
                crate::types::IteratorType::AfterSequenceNumber
            } else {
                kit.iterator_type
            },
            starting_sequence_number: saved.cloned(),
        };

        let response = kit.transport.get_shard_iterator(request).await?;
        new_states.push(Arc::new(ShardState::new(
            shard.shard_id,
            Some(response.shard_iterator),
        )));
    }

    if !new_states.is_empty() {
        let mut guard = carousel.lock();
        guard.append(new_states);
        guard.nub();
    }

    Ok(())
}

pub(super) async fn reshard_loop(carousel: SharedCarousel, kit: Arc<ConsumerKit>) {
    loop {
        match update_stream_state(&carousel, &kit).await {
            Ok(()) => {
                tracing::debug!(
                    shard_count = carousel.lock().len(),
                    "consumer reshard succeeded"
                );
                tokio::time::sleep(RESHARD_SUCCESS_INTERVAL).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "consumer reshard failed, retrying");
                tokio::time::sleep(RESHARD_FAILURE_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use crate::transport::{GetShardIteratorResponse, ShardDescriptor};
    use crate::types::{ConsumerKitBuilder, IteratorType, SavedStreamState, SequenceNumber};
    use parking_lot::Mutex;

    fn empty_carousel() -> SharedCarousel {
        Arc::new(Mutex::new(crate::carousel::Carousel::new()))
    }

    #[tokio::test]
    async fn discovers_new_shards_and_skips_known_ones() {
        let transport = Arc::new(MockTransport::new());
        let carousel = empty_carousel();
        let kit = ConsumerKitBuilder::new("stream", transport.clone()).build();

        transport.push_list_shards_response(Ok(vec![ShardDescriptor {
            shard_id: "a".to_string(),
        }]));
        transport.push_get_shard_iterator_response(Ok(GetShardIteratorResponse {
            shard_iterator: crate::types::ShardIterator("iter-a".to_string()),
        }));
        update_stream_state(&carousel, &kit).await.unwrap();
        assert_eq!(carousel.lock().len(), 1);

        // Re-discovering the same shard alone issues no further
        // GetShardIterator call (none queued, so an error would surface
        // here if the implementation re-requested it).
        transport.push_list_shards_response(Ok(vec![ShardDescriptor {
            shard_id: "a".to_string(),
        }]));
        update_stream_state(&carousel, &kit).await.unwrap();
        assert_eq!(carousel.lock().len(), 1);
    }

    #[tokio::test]
    async fn resumes_with_after_sequence_number_when_saved() {
        let transport = Arc::new(MockTransport::new());
        let carousel = empty_carousel();

        let mut saved = SavedStreamState::new();
        saved.insert("a", SequenceNumber("99".to_string()));

        let kit = ConsumerKitBuilder::new("stream", transport.clone())
            .iterator_type(IteratorType::TrimHorizon)
            .saved_stream_state(saved)
            .build();

        transport.push_list_shards_response(Ok(vec![ShardDescriptor {
            shard_id: "a".to_string(),
        }]));
        transport.push_get_shard_iterator_response(Ok(GetShardIteratorResponse {
            shard_iterator: crate::types::ShardIterator("resumed".to_string()),
        }));

        update_stream_state(&carousel, &kit).await.unwrap();

        let guard = carousel.lock();
        let shard = guard.list().first().unwrap();
        assert_eq!(
            shard.iterator(),
            Some(crate::types::ShardIterator("resumed".to_string()))
        );
        drop(guard);

        let calls = transport.get_shard_iterator_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].shard_id, "a");
        assert_eq!(calls[0].iterator_type, IteratorType::AfterSequenceNumber);
        assert_eq!(
            calls[0].starting_sequence_number,
            Some(SequenceNumber("99".to_string()))
        );
    }

    #[tokio::test]
    async fn propagates_transport_errors() {
        let transport = Arc::new(MockTransport::new());
        let carousel = empty_carousel();
        let kit = ConsumerKitBuilder::new("stream", transport.clone()).build();

        transport.push_list_shards_response(Err(TransportError::new("boom")));
        let result = update_stream_state(&carousel, &kit).await;
        assert!(result.is_err());
    }
}

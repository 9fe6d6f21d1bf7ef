//! Dispatch sinks: single-record and batch, selected by `BatchPolicy::endpoint` (§4.5).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::concurrency::map_concurrently;
use crate::transport::{
    PutRecordRequest, PutRecordsRequest, PutRecordsRequestEntry, StreamTransport,
};
use crate::types::{BatchPolicy, Endpoint, MessageQueueItem, DISPATCH_EXCEPTION_BACKOFF};

const SINGLE_SINK_STAGGER: Duration = Duration::from_millis(100);
const BATCH_SINK_STAGGER: Duration = Duration::from_millis(100);

/// Run one incoming chunk through the configured dispatch sink, returning
/// leftovers (already decremented and filtered to eligible) for the worker
/// to re-enqueue.
pub(crate) async fn dispatch_chunk(
    items: Vec<MessageQueueItem>,
    stream_name: &str,
    transport: &Arc<dyn StreamTransport>,
    batch_policy: &BatchPolicy,
    max_concurrency: usize,
) -> Vec<MessageQueueItem> {
    match batch_policy.endpoint {
        Endpoint::Single => {
            dispatch_single(items, stream_name, transport, max_concurrency).await
        }
        Endpoint::Batch => {
            dispatch_batch(
                items,
                stream_name,
                transport,
                batch_policy.batch_size,
                max_concurrency,
            )
            .await
        }
    }
}

async fn dispatch_single(
    items: Vec<MessageQueueItem>,
    stream_name: &str,
    transport: &Arc<dyn StreamTransport>,
    max_concurrency: usize,
) -> Vec<MessageQueueItem> {
    let transport = transport.clone();
    let stream_name = stream_name.to_string();

    let results = map_concurrently(
        max_concurrency,
        SINGLE_SINK_STAGGER,
        move |item: MessageQueueItem| {
            let transport = transport.clone();
            let stream_name = stream_name.clone();
            async move { dispatch_one(item, transport, stream_name).await }
        },
        items,
    )
    .await;

    results.into_iter().flatten().collect()
}

async fn dispatch_one(
    mut item: MessageQueueItem,
    transport: Arc<dyn StreamTransport>,
    stream_name: String,
) -> Option<MessageQueueItem> {
    if !item.is_eligible() {
        return None;
    }

    let request = PutRecordRequest {
        stream_name,
        data: Bytes::from(item.payload.clone().into_bytes()),
        partition_key: item.partition_key.clone(),
    };

    match transport.put_record(request).await {
        Ok(()) => {
            tracing::debug!(partition_key = %item.partition_key, "put_record succeeded");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, partition_key = %item.partition_key, "put_record failed, will retry");
            tokio::time::sleep(DISPATCH_EXCEPTION_BACKOFF).await;
            item.decrement();
            item.is_eligible().then_some(item)
        }
    }
}

async fn dispatch_batch(
    items: Vec<MessageQueueItem>,
    stream_name: &str,
    transport: &Arc<dyn StreamTransport>,
    batch_size: usize,
    max_concurrency: usize,
) -> Vec<MessageQueueItem> {
    let batch_size = batch_size.max(1);
    let sub_batches: Vec<Vec<MessageQueueItem>> =
        items.chunks(batch_size).map(|c| c.to_vec()).collect();

    let transport = transport.clone();
    let stream_name = stream_name.to_string();

    let results = map_concurrently(
        max_concurrency,
        BATCH_SINK_STAGGER,
        move |batch: Vec<MessageQueueItem>| {
            let transport = transport.clone();
            let stream_name = stream_name.clone();
            async move { dispatch_records_batch(batch, transport, stream_name).await }
        },
        sub_batches,
    )
    .await;

    results.into_iter().flatten().collect()
}

async fn dispatch_records_batch(
    batch: Vec<MessageQueueItem>,
    transport: Arc<dyn StreamTransport>,
    stream_name: String,
) -> Vec<MessageQueueItem> {
    let eligible: Vec<MessageQueueItem> = batch.into_iter().filter(|i| i.is_eligible()).collect();
    if eligible.is_empty() {
        return Vec::new();
    }

    let request = PutRecordsRequest {
        stream_name,
        records: eligible
            .iter()
            .map(|item| PutRecordsRequestEntry {
                data: Bytes::from(item.payload.clone().into_bytes()),
                partition_key: item.partition_key.clone(),
            })
            .collect(),
    };

    match transport.put_records(request).await {
        Ok(response) => {
            // Note: the exception branch (below) re-queues the whole
            // eligible sub-batch without decrementing attempts; this branch
            // decrements only the items whose per-record response carries a
            // non-empty error code. This asymmetry mirrors the template's
            // fidelity-preserving behavior — see the "retry-decrement
            // asymmetry" design note.
            eligible
                .into_iter()
                .zip(response.records)
                .filter_map(|(mut item, result)| {
                    if result.is_error() {
                        item.decrement();
                        item.is_eligible().then_some(item)
                    } else {
                        None
                    }
                })
                .collect()
        }
        Err(err) => {
            tracing::warn!(error = %err, batch_size = eligible.len(), "put_records failed, re-queueing batch");
            eligible
        }
    }
}

//! Worker task supervision, cleanup timeout, and the caller/worker race (§4.6).

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use crate::chunking::ChunkedReader;
use crate::error::ProducerError;
use crate::queue::{BoundedQueue, InMemoryQueue};
use crate::retry::RetryConfig;
use crate::types::{ChunkingPolicy, MessageQueueItem, ProducerKit};

use super::dispatch::dispatch_chunk;
use super::Producer;

/// Construct a producer backed by the default in-memory queue, spawn its
/// worker task, run `inner(producer)`, and race the two to completion.
///
/// See [`with_producer_with_queue`] for the generic form over a custom
/// [`BoundedQueue`] implementation (§9: "the producer is generic over the
/// queue implementation").
pub async fn with_producer<F, Fut, R>(kit: ProducerKit, inner: F) -> Result<R, ProducerError>
where
    F: FnOnce(Producer<InMemoryQueue<MessageQueueItem>>) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    if kit.max_concurrency < 1 {
        return Err(ProducerError::InvalidConcurrency(kit.max_concurrency));
    }
    let queue = Arc::new(InMemoryQueue::with_capacity(kit.queue_bounds));
    with_producer_with_queue(kit, queue, inner).await
}

/// Generic form of [`with_producer`] over any [`BoundedQueue`] implementation.
pub async fn with_producer_with_queue<Q, F, Fut, R>(
    kit: ProducerKit,
    queue: Arc<Q>,
    inner: F,
) -> Result<R, ProducerError>
where
    Q: BoundedQueue<MessageQueueItem> + 'static,
    F: FnOnce(Producer<Q>) -> Fut + Send + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: Send + 'static,
{
    if kit.max_concurrency < 1 {
        return Err(ProducerError::InvalidConcurrency(kit.max_concurrency));
    }

    let kit = Arc::new(kit);
    let producer = Producer {
        queue: queue.clone(),
        retry_count: kit.retry_policy.retry_count,
    };

    let mut worker_handle = tokio::spawn(worker_loop(queue.clone(), kit.clone()));
    let mut inner_handle = tokio::spawn(inner(producer));

    tokio::select! {
        inner_result = &mut inner_handle => {
            queue.close();

            let cleanup = async { (&mut worker_handle).await };
            match kit.cleanup_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, cleanup).await {
                    Ok(Ok(())) => {}
                    Ok(Err(join_err)) => {
                        let err = ProducerError::WorkerDied {
                            cause: Some(format!("worker task panicked during cleanup: {join_err}")),
                        };
                        notify_error(&kit, &err);
                        return Err(err);
                    }
                    Err(_elapsed) => {
                        let err = ProducerError::CleanupTimedOut(timeout);
                        notify_error(&kit, &err);
                        return Err(err);
                    }
                },
                None => {
                    let _ = cleanup.await;
                }
            }

            inner_result.map_err(|join_err| {
                let err = ProducerError::WorkerDied {
                    cause: Some(format!("inner task panicked: {join_err}")),
                };
                notify_error(&kit, &err);
                err
            })
        }
        worker_result = &mut worker_handle => {
            // The worker completing before the caller's task is always
            // unexpected (§4.6).
            let err = ProducerError::WorkerDied {
                cause: worker_result.err().map(|e| e.to_string()),
            };
            notify_error(&kit, &err);
            Err(err)
        }
    }
}

fn notify_error(kit: &ProducerKit, err: &ProducerError) {
    if let Some(on_error) = &kit.on_error {
        on_error(err);
    }
}

/// Drives the chunked reader through the dispatch sink. Restarts on an
/// unhandled panic (bounded by `max_worker_respawns`, with backoff between
/// restarts); returns when the queue is closed and drained. See the
/// "unbounded worker respawn" design note: the template has no analog for
/// this since its HTTP calls are synchronous request/response rather than a
/// supervised background worker, so this bound is grounded in the
/// `resilient_exporter`-style bounded-retry pattern from the wider pack.
async fn worker_loop<Q>(queue: Arc<Q>, kit: Arc<ProducerKit>)
where
    Q: BoundedQueue<MessageQueueItem> + 'static,
{
    let policy = ChunkingPolicy::derive(&kit.batch_policy, kit.max_concurrency);
    let retry_config = RetryConfig {
        initial_backoff: std::time::Duration::from_millis(50),
        max_backoff: std::time::Duration::from_secs(5),
        multiplier: 2.0,
        max_retries: kit.max_worker_respawns,
        jitter: crate::retry::JitterMode::Full,
    };

    let mut attempt = 0u32;
    let mut current_delay = retry_config.initial_backoff;

    loop {
        let queue = queue.clone();
        let kit = kit.clone();
        let policy = policy.clone();

        let result = AssertUnwindSafe(run_dispatch_loop(queue, kit, policy))
            .catch_unwind()
            .await;

        match result {
            Ok(()) => {
                tracing::debug!("producer worker loop completed, queue closed and drained");
                return;
            }
            Err(panic) => {
                let message = panic_message(&panic);
                tracing::error!(error = %message, attempt, "producer worker loop panicked, considering restart");

                if !retry_config.should_retry(attempt) {
                    tracing::error!(
                        attempts = attempt,
                        "producer worker exhausted its respawn budget, giving up"
                    );
                    return;
                }

                current_delay = retry_config.next_backoff(attempt, current_delay);
                attempt += 1;
                tokio::time::sleep(current_delay).await;
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_dispatch_loop<Q>(queue: Arc<Q>, kit: Arc<ProducerKit>, policy: ChunkingPolicy)
where
    Q: BoundedQueue<MessageQueueItem> + 'static,
{
    let reader = ChunkedReader::new(queue.clone(), policy);

    while let Some(batch) = reader.next_batch().await {
        let leftovers = dispatch_chunk(
            batch,
            &kit.stream_name,
            &kit.transport,
            &kit.batch_policy,
            kit.max_concurrency,
        )
        .await;

        for item in leftovers {
            match queue.try_write(item) {
                crate::queue::WriteOutcome::Written => {}
                crate::queue::WriteOutcome::Full => {
                    tracing::warn!("dropping retried item: queue is full");
                }
                crate::queue::WriteOutcome::Closed => {
                    tracing::warn!("dropping retried item: queue is closed");
                }
            }
        }
    }
}

//! The `runRequest` collaborator: the only interface the core requires of
//! the (out-of-scope) Stream Service SDK.
//!
//! Request signing, HTTP transport, and credential/config loading belong to
//! an external SDK. This module defines the small set of request/response
//! value types and the trait a concrete SDK adapter implements.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::TransportError;
use crate::types::{IteratorType, SequenceNumber, ShardIterator};

#[derive(Debug, Clone)]
pub struct PutRecordRequest {
    pub stream_name: String,
    pub data: Bytes,
    pub partition_key: String,
}

#[derive(Debug, Clone)]
pub struct PutRecordsRequestEntry {
    pub data: Bytes,
    pub partition_key: String,
}

#[derive(Debug, Clone)]
pub struct PutRecordsRequest {
    pub stream_name: String,
    pub records: Vec<PutRecordsRequestEntry>,
}

/// Per-record result, in the same order as the submitted entries. A
/// non-empty `error_code` marks that entry as failed.
#[derive(Debug, Clone, Default)]
pub struct PutRecordsResultEntry {
    pub error_code: Option<String>,
}

impl PutRecordsResultEntry {
    pub fn is_error(&self) -> bool {
        self.error_code.as_deref().is_some_and(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutRecordsResponse {
    pub records: Vec<PutRecordsResultEntry>,
}

#[derive(Debug, Clone)]
pub struct GetShardIteratorRequest {
    pub stream_name: String,
    pub shard_id: String,
    pub iterator_type: IteratorType,
    pub starting_sequence_number: Option<SequenceNumber>,
}

#[derive(Debug, Clone)]
pub struct GetShardIteratorResponse {
    pub shard_iterator: ShardIterator,
}

#[derive(Debug, Clone)]
pub struct GetRecordsRequest {
    pub shard_iterator: ShardIterator,
    pub limit: usize,
}

#[derive(Debug, Clone)]
pub struct RecordData {
    pub sequence_number: SequenceNumber,
    pub partition_key: String,
    pub data: Bytes,
}

#[derive(Debug, Clone, Default)]
pub struct GetRecordsResponse {
    pub records: Vec<RecordData>,
    pub next_shard_iterator: Option<ShardIterator>,
}

#[derive(Debug, Clone)]
pub struct ShardDescriptor {
    pub shard_id: String,
}

/// The Stream Service SDK's request surface, as required by the core.
///
/// A concrete implementation wraps request signing and HTTP transport; none
/// of that is this crate's concern. Implementations must be safe to call
/// concurrently from many tasks.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn put_record(&self, request: PutRecordRequest) -> Result<(), TransportError>;

    async fn put_records(
        &self,
        request: PutRecordsRequest,
    ) -> Result<PutRecordsResponse, TransportError>;

    async fn get_shard_iterator(
        &self,
        request: GetShardIteratorRequest,
    ) -> Result<GetShardIteratorResponse, TransportError>;

    async fn get_records(
        &self,
        request: GetRecordsRequest,
    ) -> Result<GetRecordsResponse, TransportError>;

    /// Lists currently-open shards for `stream_name` (the `ListShards`
    /// collaborator behind `streamOpenShardSource`).
    async fn list_shards(&self, stream_name: &str) -> Result<Vec<ShardDescriptor>, TransportError>;
}

/// An in-memory [`StreamTransport`] that replays scripted responses. This is
/// the seam the producer dispatch sinks and the consumer pull loop are
/// tested against (§9's "polymorphic collaborator" design note), and is kept
/// public rather than test-internal since downstream crates embedding this
/// one as a dependency benefit from it too.
#[derive(Default)]
pub struct MockTransport {
    state: parking_lot::Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    put_record_calls: Vec<PutRecordRequest>,
    put_record_responses: std::collections::VecDeque<Result<(), TransportError>>,
    put_records_calls: Vec<PutRecordsRequest>,
    put_records_responses: std::collections::VecDeque<Result<PutRecordsResponse, TransportError>>,
    get_shard_iterator_calls: Vec<GetShardIteratorRequest>,
    get_shard_iterator_responses:
        std::collections::VecDeque<Result<GetShardIteratorResponse, TransportError>>,
    get_records_calls: Vec<GetRecordsRequest>,
    get_records_responses: std::collections::VecDeque<Result<GetRecordsResponse, TransportError>>,
    list_shards_calls: Vec<String>,
    list_shards_responses: std::collections::VecDeque<Result<Vec<ShardDescriptor>, TransportError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next `put_records` response (FIFO).
    pub fn push_put_records_response(&self, response: Result<PutRecordsResponse, TransportError>) {
        self.state.lock().put_records_responses.push_back(response);
    }

    /// Queue the next `put_record` response (FIFO).
    pub fn push_put_record_response(&self, response: Result<(), TransportError>) {
        self.state.lock().put_record_responses.push_back(response);
    }

    /// Queue the next `get_shard_iterator` response (FIFO).
    pub fn push_get_shard_iterator_response(
        &self,
        response: Result<GetShardIteratorResponse, TransportError>,
    ) {
        self.state
            .lock()
            .get_shard_iterator_responses
            .push_back(response);
    }

    /// Queue the next `get_records` response (FIFO).
    pub fn push_get_records_response(&self, response: Result<GetRecordsResponse, TransportError>) {
        self.state.lock().get_records_responses.push_back(response);
    }

    /// Queue the next `list_shards` response (FIFO).
    pub fn push_list_shards_response(&self, response: Result<Vec<ShardDescriptor>, TransportError>) {
        self.state.lock().list_shards_responses.push_back(response);
    }

    /// Requests received by `put_record`, in call order.
    pub fn put_record_calls(&self) -> Vec<PutRecordRequest> {
        self.state.lock().put_record_calls.clone()
    }

    /// Requests received by `put_records`, in call order.
    pub fn put_records_calls(&self) -> Vec<PutRecordsRequest> {
        self.state.lock().put_records_calls.clone()
    }

    /// Requests received by `get_shard_iterator`, in call order.
    pub fn get_shard_iterator_calls(&self) -> Vec<GetShardIteratorRequest> {
        self.state.lock().get_shard_iterator_calls.clone()
    }

    /// Requests received by `get_records`, in call order.
    pub fn get_records_calls(&self) -> Vec<GetRecordsRequest> {
        self.state.lock().get_records_calls.clone()
    }

    /// Stream names passed to `list_shards`, in call order.
    pub fn list_shards_calls(&self) -> Vec<String> {
        self.state.lock().list_shards_calls.clone()
    }
}

#[async_trait]
impl StreamTransport for MockTransport {
    async fn put_record(&self, request: PutRecordRequest) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.put_record_calls.push(request);
        state
            .put_record_responses
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn put_records(
        &self,
        request: PutRecordsRequest,
    ) -> Result<PutRecordsResponse, TransportError> {
        let mut state = self.state.lock();
        state.put_records_calls.push(request.clone());
        state.put_records_responses.pop_front().unwrap_or_else(|| {
            Ok(PutRecordsResponse {
                records: request
                    .records
                    .iter()
                    .map(|_| PutRecordsResultEntry::default())
                    .collect(),
            })
        })
    }

    async fn get_shard_iterator(
        &self,
        request: GetShardIteratorRequest,
    ) -> Result<GetShardIteratorResponse, TransportError> {
        let mut state = self.state.lock();
        state.get_shard_iterator_calls.push(request);
        state.get_shard_iterator_responses.pop_front().unwrap_or_else(|| {
            Err(TransportError::new(
                "MockTransport: no get_shard_iterator response queued",
            ))
        })
    }

    async fn get_records(
        &self,
        request: GetRecordsRequest,
    ) -> Result<GetRecordsResponse, TransportError> {
        let mut state = self.state.lock();
        state.get_records_calls.push(request);
        state.get_records_responses.pop_front().unwrap_or_else(|| {
            Err(TransportError::new(
                "MockTransport: no get_records response queued",
            ))
        })
    }

    async fn list_shards(&self, stream_name: &str) -> Result<Vec<ShardDescriptor>, TransportError> {
        let mut state = self.state.lock();
        state.list_shards_calls.push(stream_name.to_string());
        state.list_shards_responses.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_record_defaults_to_ok_when_nothing_queued() {
        let transport = MockTransport::new();
        let result = transport
            .put_record(PutRecordRequest {
                stream_name: "s".to_string(),
                data: Bytes::from_static(b"x"),
                partition_key: "pk".to_string(),
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(transport.put_record_calls().len(), 1);
    }

    #[tokio::test]
    async fn put_records_defaults_to_all_success_mirroring_input_len() {
        let transport = MockTransport::new();
        let request = PutRecordsRequest {
            stream_name: "s".to_string(),
            records: vec![
                PutRecordsRequestEntry {
                    data: Bytes::from_static(b"a"),
                    partition_key: "1".to_string(),
                },
                PutRecordsRequestEntry {
                    data: Bytes::from_static(b"b"),
                    partition_key: "2".to_string(),
                },
            ],
        };
        let response = transport.put_records(request).await.unwrap();
        assert_eq!(response.records.len(), 2);
        assert!(response.records.iter().all(|r| !r.is_error()));
    }

    #[tokio::test]
    async fn queued_responses_are_replayed_fifo() {
        let transport = MockTransport::new();
        transport.push_put_record_response(Err(TransportError::new("first")));
        transport.push_put_record_response(Ok(()));

        let request = PutRecordRequest {
            stream_name: "s".to_string(),
            data: Bytes::from_static(b"x"),
            partition_key: "pk".to_string(),
        };
        let first = transport.put_record(request.clone()).await;
        let second = transport.put_record(request).await;

        assert!(first.is_err());
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn get_records_errors_when_nothing_queued() {
        let transport = MockTransport::new();
        let result = transport
            .get_records(GetRecordsRequest {
                shard_iterator: ShardIterator("iter".to_string()),
                limit: 10,
            })
            .await;
        assert!(result.is_err());
    }
}

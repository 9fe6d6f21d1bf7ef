//! Minimal end-to-end demo wiring a [`Producer`] and consumer against an
//! in-memory [`MockTransport`], grounded in the template's
//! `conformance_adapter` binary as the idiomatic shape for an in-tree demo
//! that exercises the public surface without a real Stream Service.

use std::sync::Arc;
use std::time::Duration;

use kinesis_stream_core::transport::{
    GetRecordsResponse, GetShardIteratorResponse, MockTransport, RecordData, ShardDescriptor,
};
use kinesis_stream_core::{consumer, producer, ConsumerKitBuilder, ProducerKitBuilder, SequenceNumber, ShardIterator};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let transport = Arc::new(MockTransport::new());

    transport.push_list_shards_response(Ok(vec![ShardDescriptor {
        shard_id: "shard-0".to_string(),
    }]));
    transport.push_get_shard_iterator_response(Ok(GetShardIteratorResponse {
        shard_iterator: ShardIterator("iter-0".to_string()),
    }));
    transport.push_get_records_response(Ok(GetRecordsResponse {
        records: vec![RecordData {
            sequence_number: SequenceNumber("1".to_string()),
            partition_key: "demo".to_string(),
            data: "hello".into(),
        }],
        next_shard_iterator: Some(ShardIterator("iter-1".to_string())),
    }));

    let producer_kit = ProducerKitBuilder::new("demo-stream", transport.clone()).build();
    producer::with_producer(producer_kit, |p| async move {
        p.write("hello from the demo producer".to_string())
            .expect("queue has room");
        tokio::time::sleep(Duration::from_millis(50)).await;
    })
    .await
    .expect("producer lifecycle should complete cleanly");

    let consumer_kit = ConsumerKitBuilder::new("demo-stream", transport).build();
    consumer::with_consumer(consumer_kit, |c| async move {
        if let Some(record) = c.read().await {
            println!(
                "read record {:?} from shard {}",
                record.record.sequence_number, record.shard.shard_id
            );
        }
    })
    .await
    .expect("consumer config is valid");
}

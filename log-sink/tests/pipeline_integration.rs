//! Integration tests for the publish -> consume -> bulk-write -> acknowledge path.
//!
//! These tests use the real publisher, consumer and flush engine over the
//! in-memory broker, with a scripted bulk provider.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use log_sink::encoder::IndexRequestEncoder;
use log_sink::errors::IngestError;
use log_sink::loader::{BulkFlushEngine, ChunkOutcome, FlushReport};
use log_sink::publisher::Publisher;
use log_sink::queue::{InMemoryBroker, QueueBroker, QueueConsumer};
use log_sink::supervisor::PipelineStats;
use log_sink_repository::{BulkIndexError, BulkIndexProvider, BulkItemResult, BulkWriteSummary};
use log_sink_shared::IndexAction;

const CONSUMER: &str = "log-sink-0";

// Provider that rejects each listed document once, then accepts it.
struct ScriptedProvider {
    reject_once: Mutex<HashSet<String>>,
    chunks: Mutex<Vec<Vec<IndexAction>>>,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            reject_once: Mutex::new(HashSet::new()),
            chunks: Mutex::new(Vec::new()),
        }
    }

    fn reject_once(&self, document_id: &str) {
        self.reject_once
            .lock()
            .unwrap()
            .insert(document_id.to_string());
    }

    fn chunks(&self) -> Vec<Vec<IndexAction>> {
        self.chunks.lock().unwrap().clone()
    }

    fn submitted_ids(&self) -> Vec<Vec<String>> {
        self.chunks()
            .into_iter()
            .map(|chunk| chunk.into_iter().map(|a| a.document_id).collect())
            .collect()
    }
}

#[async_trait]
impl BulkIndexProvider for ScriptedProvider {
    async fn ensure_ready(&self) -> Result<(), BulkIndexError> {
        Ok(())
    }

    async fn bulk_write(&self, actions: &[IndexAction]) -> Result<BulkWriteSummary, BulkIndexError> {
        self.chunks.lock().unwrap().push(actions.to_vec());

        let mut reject = self.reject_once.lock().unwrap();
        let results = actions
            .iter()
            .map(|a| {
                if reject.remove(&a.document_id) {
                    BulkItemResult::failed(
                        a.document_id.clone(),
                        429,
                        "es_rejected_execution_exception: queue full",
                    )
                } else {
                    BulkItemResult::ok(a.document_id.clone())
                }
            })
            .collect();

        Ok(BulkWriteSummary::from_results(actions.len(), results))
    }
}

fn document(message: &str) -> Value {
    json!({
        "meniscus": {"tenant": "5164", "correlation": {"pattern": "auth_failure"}},
        "message": message
    })
}

fn publisher(broker: &InMemoryBroker) -> Publisher {
    Publisher::new(
        Arc::new(broker.clone()),
        IndexRequestEncoder::new(Duration::from_secs(3600)),
    )
}

async fn engine(
    broker: &InMemoryBroker,
    provider: Arc<ScriptedProvider>,
    bulk_size: usize,
    bulk_timeout: Duration,
) -> BulkFlushEngine {
    let session = broker.open_session(CONSUMER).await.unwrap();
    let consumer = QueueConsumer::new(session, bulk_timeout);
    BulkFlushEngine::new(
        0,
        consumer,
        provider,
        bulk_size,
        Arc::new(PipelineStats::new()),
    )
}

#[tokio::test]
async fn test_published_document_reaches_backend_unchanged() {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(ScriptedProvider::new());

    let published = publisher(&broker)
        .publish_document(document("password rejected"))
        .await
        .unwrap();

    let mut engine = engine(&broker, provider.clone(), 1, Duration::from_millis(50)).await;
    engine.run_chunk(&CancellationToken::new()).await.unwrap();

    let chunks = provider.chunks();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0], vec![published.clone()]);
    assert_eq!(chunks[0][0].target_collection, "5164");
    assert_eq!(chunks[0][0].document_type, "auth_failure");
    assert_eq!(chunks[0][0].payload, document("password rejected"));
    assert_eq!(broker.total_pending(), 0);
}

#[tokio::test]
async fn test_rejected_document_is_redelivered_and_others_acknowledged() {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(ScriptedProvider::new());
    let publisher = publisher(&broker);

    let a = publisher.publish_document(document("A")).await.unwrap();
    let b = publisher.publish_document(document("B")).await.unwrap();
    let c = publisher.publish_document(document("C")).await.unwrap();
    provider.reject_once(&b.document_id);

    let mut engine = engine(&broker, provider.clone(), 3, Duration::from_millis(50)).await;
    let shutdown = CancellationToken::new();

    let first = engine.run_chunk(&shutdown).await.unwrap();
    assert_eq!(
        first,
        ChunkOutcome::Flushed(FlushReport {
            submitted: 3,
            acknowledged: 2,
            unacknowledged: 1,
        })
    );
    // A and C are acknowledged; B is still pending for this consumer.
    assert_eq!(broker.acked_ids(), vec!["1-0", "3-0"]);
    assert_eq!(broker.pending_count(CONSUMER), 1);

    // B comes back on the next cycle and is written as a partial chunk.
    let second = engine.run_chunk(&shutdown).await.unwrap();
    assert_eq!(
        second,
        ChunkOutcome::Flushed(FlushReport {
            submitted: 1,
            acknowledged: 1,
            unacknowledged: 0,
        })
    );
    assert_eq!(broker.acked_ids(), vec!["1-0", "3-0", "2-0"]);
    assert_eq!(broker.delivery_count("2-0"), 2);
    assert_eq!(broker.total_pending(), 0);

    assert_eq!(
        provider.submitted_ids(),
        vec![
            vec![a.document_id, b.document_id.clone(), c.document_id],
            vec![b.document_id],
        ]
    );
}

#[tokio::test]
async fn test_acknowledgments_follow_pull_order() {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(ScriptedProvider::new());
    let publisher = publisher(&broker);

    for n in 0..5 {
        publisher
            .publish_document(document(&format!("event {}", n)))
            .await
            .unwrap();
    }

    let mut engine = engine(&broker, provider, 5, Duration::from_millis(50)).await;
    engine.run_chunk(&CancellationToken::new()).await.unwrap();

    assert_eq!(broker.acked_ids(), vec!["1-0", "2-0", "3-0", "4-0", "5-0"]);
}

#[tokio::test(start_paused = true)]
async fn test_bulk_timeout_with_no_messages_submits_nothing() {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(ScriptedProvider::new());
    let mut engine = engine(&broker, provider.clone(), 100, Duration::from_secs(60)).await;

    let outcome = engine.run_chunk(&CancellationToken::new()).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Idle);
    assert!(provider.chunks().is_empty());
}

#[tokio::test]
async fn test_repeated_declarations_are_harmless() {
    let broker = InMemoryBroker::new();
    broker.declare().await.unwrap();
    broker.declare().await.unwrap();

    let publisher = publisher(&broker);
    publisher.publish_document(document("x")).await.unwrap();

    assert_eq!(broker.ready_count(), 1);
}

#[tokio::test]
async fn test_malformed_document_never_reaches_queue() {
    let broker = InMemoryBroker::new();
    let publisher = publisher(&broker);

    let result = publisher
        .publish_document(json!({"meniscus": {"tenant": "5164"}}))
        .await;

    assert!(matches!(result, Err(IngestError::MalformedDocument(_))));
    assert_eq!(broker.ready_count(), 0);
}

#[tokio::test]
async fn test_shutdown_leaves_partial_chunk_for_redelivery() {
    let broker = InMemoryBroker::new();
    let provider = Arc::new(ScriptedProvider::new());
    publisher(&broker)
        .publish_document(document("half a chunk"))
        .await
        .unwrap();

    let shutdown = CancellationToken::new();
    let mut engine = engine(&broker, provider.clone(), 10, Duration::from_secs(60)).await;

    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        stopper.cancel();
    });

    let outcome = engine.run_chunk(&shutdown).await.unwrap();

    assert_eq!(outcome, ChunkOutcome::Shutdown);
    assert!(provider.chunks().is_empty());
    assert!(broker.acked_ids().is_empty());
    assert_eq!(broker.pending_count(CONSUMER), 1);
}

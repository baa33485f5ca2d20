//! In-memory queue broker.
//!
//! Mirrors the consumer-group semantics of the Redis Streams broker inside a
//! single process: entries are delivered to one consumer, stay pending for that
//! consumer until acknowledged, and are redelivered to a new session opened
//! under the same consumer name.
//!
//! # Example
//!
//! ```ignore
//! use log_sink::queue::{InMemoryBroker, QueueBroker};
//!
//! let broker = InMemoryBroker::new();
//! broker.declare().await?;
//! broker.enqueue(action.to_json_bytes()?).await?;
//!
//! let mut session = broker.open_session("log-sink-0").await?;
//! let entry = session.pull(Duration::from_millis(50)).await?;
//! ```

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use super::broker::{QueueBroker, QueueSession};
use super::messages::{AckHandle, QueueEntry};
use crate::errors::IngestError;

#[derive(Default)]
struct State {
    declare_calls: usize,
    next_seq: u64,
    ready: VecDeque<(u64, Vec<u8>)>,
    pending: HashMap<String, BTreeMap<u64, Vec<u8>>>,
    deliveries: HashMap<u64, u32>,
    acked: Vec<String>,
}

impl State {
    fn deliver(&mut self, consumer: &str, seq: u64, payload: Vec<u8>) -> QueueEntry {
        *self.deliveries.entry(seq).or_insert(0) += 1;
        self.pending
            .entry(consumer.to_string())
            .or_default()
            .insert(seq, payload.clone());
        QueueEntry::new(AckHandle::new(entry_id(seq)), payload)
    }
}

fn entry_id(seq: u64) -> String {
    format!("{}-0", seq)
}

fn parse_entry_id(id: &str) -> Option<u64> {
    id.split('-').next().and_then(|s| s.parse().ok())
}

/// Queue broker that keeps every entry in process memory.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl InMemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of entries not yet delivered to any consumer.
    pub fn ready_count(&self) -> usize {
        self.state().ready.len()
    }

    /// Number of delivered but unacknowledged entries owned by `consumer`.
    pub fn pending_count(&self, consumer: &str) -> usize {
        self.state().pending.get(consumer).map_or(0, BTreeMap::len)
    }

    /// Number of delivered but unacknowledged entries across all consumers.
    pub fn total_pending(&self) -> usize {
        self.state().pending.values().map(BTreeMap::len).sum()
    }

    /// Entry ids in the order they were acknowledged.
    pub fn acked_ids(&self) -> Vec<String> {
        self.state().acked.clone()
    }

    /// How many times the entry was delivered.
    pub fn delivery_count(&self, entry_id: &str) -> u32 {
        parse_entry_id(entry_id)
            .and_then(|seq| self.state().deliveries.get(&seq).copied())
            .unwrap_or(0)
    }

    /// How many times `declare` was called.
    pub fn declare_count(&self) -> usize {
        self.state().declare_calls
    }
}

#[async_trait]
impl QueueBroker for InMemoryBroker {
    async fn declare(&self) -> Result<(), IngestError> {
        self.state().declare_calls += 1;
        Ok(())
    }

    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, IngestError> {
        let id = {
            let mut state = self.state();
            state.next_seq += 1;
            let seq = state.next_seq;
            state.ready.push_back((seq, payload));
            entry_id(seq)
        };
        self.notify.notify_one();
        Ok(id)
    }

    async fn open_session(&self, consumer_name: &str) -> Result<Box<dyn QueueSession>, IngestError> {
        debug!(consumer = consumer_name, "Opened in-memory session");
        Ok(Box::new(InMemorySession {
            broker: self.clone(),
            consumer: consumer_name.to_string(),
            replay_after: Some(0),
        }))
    }
}

struct InMemorySession {
    broker: InMemoryBroker,
    consumer: String,
    replay_after: Option<u64>,
}

impl InMemorySession {
    fn next_replayed(&mut self, after: u64) -> Option<QueueEntry> {
        let mut state = self.broker.state();
        let (seq, payload) = state
            .pending
            .get(&self.consumer)?
            .range((Bound::Excluded(after), Bound::Unbounded))
            .next()
            .map(|(seq, payload)| (*seq, payload.clone()))?;
        Some(state.deliver(&self.consumer, seq, payload))
    }

    fn next_ready(&self) -> Option<QueueEntry> {
        let mut state = self.broker.state();
        let (seq, payload) = state.ready.pop_front()?;
        Some(state.deliver(&self.consumer, seq, payload))
    }
}

#[async_trait]
impl QueueSession for InMemorySession {
    async fn pull(&mut self, timeout: Duration) -> Result<Option<QueueEntry>, IngestError> {
        if let Some(after) = self.replay_after {
            match self.next_replayed(after) {
                Some(entry) => {
                    self.replay_after = parse_entry_id(entry.handle.entry_id());
                    return Ok(Some(entry));
                }
                None => self.replay_after = None,
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.next_ready() {
                return Ok(Some(entry));
            }
            if tokio::time::timeout_at(deadline, self.broker.notify.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, handle: AckHandle) -> Result<(), IngestError> {
        let seq = parse_entry_id(handle.entry_id())
            .ok_or_else(|| IngestError::queue(format!("invalid entry id {}", handle.entry_id())))?;

        let mut state = self.broker.state();
        let removed = state
            .pending
            .get_mut(&self.consumer)
            .and_then(|pending| pending.remove(&seq))
            .is_some();
        if removed {
            state.acked.push(handle.entry_id().to_string());
        }
        Ok(())
    }

    fn request_redelivery(&mut self) {
        self.replay_after = Some(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_millis(20);

    #[tokio::test]
    async fn test_entries_are_delivered_in_order() {
        let broker = InMemoryBroker::new();
        broker.enqueue(b"one".to_vec()).await.unwrap();
        broker.enqueue(b"two".to_vec()).await.unwrap();

        let mut session = broker.open_session("c").await.unwrap();
        let first = session.pull(WAIT).await.unwrap().unwrap();
        let second = session.pull(WAIT).await.unwrap().unwrap();

        assert_eq!(first.payload, b"one");
        assert_eq!(second.payload, b"two");
        assert_eq!(broker.pending_count("c"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_times_out_when_empty() {
        let broker = InMemoryBroker::new();
        let mut session = broker.open_session("c").await.unwrap();

        let entry = session.pull(Duration::from_secs(5)).await.unwrap();
        assert!(entry.is_none());
    }

    #[tokio::test]
    async fn test_pull_wakes_on_enqueue() {
        let broker = InMemoryBroker::new();
        let mut session = broker.open_session("c").await.unwrap();

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.enqueue(b"late".to_vec()).await.unwrap();
        });

        let entry = session.pull(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(entry.payload, b"late");
    }

    #[tokio::test]
    async fn test_ack_removes_pending_entry() {
        let broker = InMemoryBroker::new();
        let id = broker.enqueue(b"x".to_vec()).await.unwrap();
        let mut session = broker.open_session("c").await.unwrap();

        let entry = session.pull(WAIT).await.unwrap().unwrap();
        session.ack(entry.handle).await.unwrap();

        assert_eq!(broker.pending_count("c"), 0);
        assert_eq!(broker.acked_ids(), vec![id]);
    }

    #[tokio::test]
    async fn test_new_session_replays_unacknowledged_entries() {
        let broker = InMemoryBroker::new();
        let id = broker.enqueue(b"x".to_vec()).await.unwrap();

        let mut first = broker.open_session("c").await.unwrap();
        let _dropped = first.pull(WAIT).await.unwrap().unwrap();
        drop(first);

        let mut second = broker.open_session("c").await.unwrap();
        let replayed = second.pull(WAIT).await.unwrap().unwrap();

        assert_eq!(replayed.handle.entry_id(), id);
        assert_eq!(broker.delivery_count(&id), 2);
    }

    #[tokio::test]
    async fn test_other_consumer_does_not_see_pending_entries() {
        let broker = InMemoryBroker::new();
        broker.enqueue(b"x".to_vec()).await.unwrap();

        let mut owner = broker.open_session("a").await.unwrap();
        let _entry = owner.pull(WAIT).await.unwrap().unwrap();

        let mut other = broker.open_session("b").await.unwrap();
        assert!(other.pull(WAIT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_redelivery_replays_before_new_entries() {
        let broker = InMemoryBroker::new();
        let failed = broker.enqueue(b"failed".to_vec()).await.unwrap();
        let mut session = broker.open_session("c").await.unwrap();
        let _entry = session.pull(WAIT).await.unwrap().unwrap();

        broker.enqueue(b"fresh".to_vec()).await.unwrap();
        session.request_redelivery();

        let replayed = session.pull(WAIT).await.unwrap().unwrap();
        assert_eq!(replayed.handle.entry_id(), failed);
        let fresh = session.pull(WAIT).await.unwrap().unwrap();
        assert_eq!(fresh.payload, b"fresh");
    }

    #[tokio::test]
    async fn test_declare_is_idempotent() {
        let broker = InMemoryBroker::new();
        broker.declare().await.unwrap();
        broker.declare().await.unwrap();
        assert_eq!(broker.declare_count(), 2);
    }
}

//! Redis Streams queue broker.
//!
//! The queue is a stream read through a consumer group. Each entry carries the
//! serialized index action in a single field. Entries delivered to a consumer
//! stay in the group's pending entries list until `XACK`, so a worker that
//! reconnects under the same consumer name first re-reads its own backlog.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamPendingId, StreamReadOptions,
    StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info, instrument};

use super::broker::{QueueBroker, QueueSession};
use super::messages::{AckHandle, QueueEntry};
use crate::errors::IngestError;

/// Stream field holding the serialized index action.
pub const PAYLOAD_FIELD: &str = "payload";

/// Pending entries inspected per `XPENDING` page while reclaiming.
const RECLAIM_BATCH: usize = 100;

/// Settings for a Redis Streams broker.
#[derive(Debug, Clone)]
pub struct RedisBrokerConfig {
    /// Redis connection URL.
    pub url: String,
    /// Stream key; also used as the consumer group name.
    pub queue_name: String,
    /// Entries idle at another consumer for at least this long are claimed
    /// when a session opens.
    pub claim_idle: Duration,
}

/// Queue broker backed by a Redis stream and consumer group.
pub struct RedisBroker {
    client: redis::Client,
    publisher: ConnectionManager,
    stream_key: String,
    group: String,
    claim_idle: Duration,
}

impl RedisBroker {
    /// Connect to Redis.
    ///
    /// The publishing connection is a `ConnectionManager` and reconnects on its
    /// own. Every consuming session opens a fresh connection.
    pub async fn new(config: RedisBrokerConfig) -> Result<Self, IngestError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| IngestError::queue(format!("Invalid Redis URL: {}", e)))?;
        let publisher = client.get_connection_manager().await?;

        info!(
            queue = %config.queue_name,
            claim_idle_secs = config.claim_idle.as_secs(),
            "Connected to Redis"
        );

        Ok(Self {
            client,
            publisher,
            group: config.queue_name.clone(),
            stream_key: config.queue_name,
            claim_idle: config.claim_idle,
        })
    }
}

/// `XGROUP CREATE ... MKSTREAM`, treating an existing group as success.
async fn declare_group<C>(conn: &mut C, stream_key: &str, group: &str) -> Result<(), IngestError>
where
    C: redis::aio::ConnectionLike + Send,
{
    let result: redis::RedisResult<()> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(stream_key)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(()) => {
            info!(stream = stream_key, group = group, "Created consumer group");
            Ok(())
        }
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl QueueBroker for RedisBroker {
    async fn declare(&self) -> Result<(), IngestError> {
        let mut conn = self.publisher.clone();
        declare_group(&mut conn, &self.stream_key, &self.group).await
    }

    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, IngestError> {
        let mut conn = self.publisher.clone();
        let id: String = conn
            .xadd(&self.stream_key, "*", &[(PAYLOAD_FIELD, payload)])
            .await?;
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn open_session(&self, consumer_name: &str) -> Result<Box<dyn QueueSession>, IngestError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        declare_group(&mut conn, &self.stream_key, &self.group).await?;

        let mut session = RedisSession {
            conn,
            stream_key: self.stream_key.clone(),
            group: self.group.clone(),
            consumer: consumer_name.to_string(),
            position: ReadPosition::replay(),
        };
        session.reclaim_stale(self.claim_idle).await?;

        debug!(consumer = consumer_name, "Opened Redis session");
        Ok(Box::new(session))
    }
}

struct RedisSession {
    conn: MultiplexedConnection,
    stream_key: String,
    group: String,
    consumer: String,
    position: ReadPosition,
}

/// Where the next group read starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReadPosition {
    /// Re-reading this consumer's pending entries after the given id.
    Backlog(String),
    /// Reading entries never delivered to the group (`>`).
    New,
}

impl ReadPosition {
    fn replay() -> Self {
        Self::Backlog("0".to_string())
    }

    /// Move past a backlog read. An empty read ends the replay.
    fn advance(&mut self, delivered: Option<&str>) {
        if let Self::Backlog(after) = self {
            match delivered {
                Some(id) => *after = id.to_string(),
                None => *self = Self::New,
            }
        }
    }
}

/// Pending entries held by other consumers.
fn foreign_entries(page: &[StreamPendingId], consumer: &str) -> Vec<String> {
    page.iter()
        .filter(|p| p.consumer != consumer)
        .map(|p| p.id.clone())
        .collect()
}

/// Exclusive start of the next `XPENDING` page, or `None` on the last page.
fn next_page_start(page: &[StreamPendingId], batch: usize) -> Option<String> {
    if page.len() < batch {
        return None;
    }
    page.last().map(|p| format!("({}", p.id))
}

impl RedisSession {
    /// Claim entries left pending by consumers that no longer exist, e.g.
    /// after the pool shrank.
    ///
    /// Pages through the whole pending list with the server-side `IDLE`
    /// filter, so a long backlog of live entries cannot hide stale ones.
    async fn reclaim_stale(&mut self, min_idle: Duration) -> Result<usize, IngestError> {
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);
        let mut start = "-".to_string();
        let mut claimed = 0;

        loop {
            let reply: StreamPendingCountReply = redis::cmd("XPENDING")
                .arg(&self.stream_key)
                .arg(&self.group)
                .arg("IDLE")
                .arg(min_idle_ms)
                .arg(&start)
                .arg("+")
                .arg(RECLAIM_BATCH)
                .query_async(&mut self.conn)
                .await?;

            let stale = foreign_entries(&reply.ids, &self.consumer);
            if !stale.is_empty() {
                let reply: StreamClaimReply = self
                    .conn
                    .xclaim(&self.stream_key, &self.group, &self.consumer, min_idle_ms, &stale)
                    .await?;
                claimed += reply.ids.len();
            }

            match next_page_start(&reply.ids, RECLAIM_BATCH) {
                Some(next) => start = next,
                None => break,
            }
        }

        if claimed > 0 {
            info!(
                consumer = %self.consumer,
                count = claimed,
                "Claimed stale pending entries"
            );
        }
        Ok(claimed)
    }

    async fn read_one(
        &mut self,
        id: &str,
        options: &StreamReadOptions,
    ) -> Result<Option<StreamId>, IngestError> {
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream_key], &[id], options)
            .await?;

        Ok(reply
            .and_then(|r| r.keys.into_iter().next())
            .and_then(|k| k.ids.into_iter().next()))
    }

    fn group_options(&self) -> StreamReadOptions {
        StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1)
    }
}

fn into_entry(stream_id: StreamId) -> QueueEntry {
    // A trimmed entry comes back without fields; the consumer treats the empty
    // payload as undecodable and acknowledges it.
    let payload = stream_id
        .get::<Vec<u8>>(PAYLOAD_FIELD)
        .unwrap_or_default();
    QueueEntry::new(AckHandle::new(stream_id.id), payload)
}

#[async_trait]
impl QueueSession for RedisSession {
    async fn pull(&mut self, timeout: Duration) -> Result<Option<QueueEntry>, IngestError> {
        if let ReadPosition::Backlog(after) = &self.position {
            let after = after.clone();
            let options = self.group_options();
            let delivered = self.read_one(&after, &options).await?;
            self.position.advance(delivered.as_ref().map(|s| s.id.as_str()));
            match delivered {
                Some(stream_id) => return Ok(Some(into_entry(stream_id))),
                None => debug!(consumer = %self.consumer, "Pending backlog drained"),
            }
        }

        // BLOCK 0 waits forever.
        let block_ms = usize::try_from(timeout.as_millis()).unwrap_or(usize::MAX).max(1);
        let options = self.group_options().block(block_ms);
        Ok(self.read_one(">", &options).await?.map(into_entry))
    }

    async fn ack(&mut self, handle: AckHandle) -> Result<(), IngestError> {
        let _: i64 = self
            .conn
            .xack(&self.stream_key, &self.group, &[handle.entry_id()])
            .await?;
        Ok(())
    }

    fn request_redelivery(&mut self) {
        self.position = ReadPosition::replay();
    }
}

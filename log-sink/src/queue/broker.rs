//! Durable queue traits.
//!
//! A broker owns the named queue. Each worker opens its own session, which
//! tracks the entries delivered to it until they are acknowledged.

use std::time::Duration;

use async_trait::async_trait;

use super::messages::{AckHandle, QueueEntry};
use crate::errors::IngestError;

/// A durable, named work queue shared by publishers and workers.
#[async_trait]
pub trait QueueBroker: Send + Sync {
    /// Create the queue and its consumer group if they do not exist.
    ///
    /// Declaring an existing queue is a no-op.
    async fn declare(&self) -> Result<(), IngestError>;

    /// Append a serialized index action to the queue.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The broker-assigned entry id
    /// * `Err(IngestError)` - If the broker was unreachable or refused the entry
    async fn enqueue(&self, payload: Vec<u8>) -> Result<String, IngestError>;

    /// Open a consuming session on a dedicated connection.
    ///
    /// Sessions opened with the same `consumer_name` own the same set of
    /// delivered-but-unacknowledged entries. A new session first redelivers
    /// those entries before pulling new ones.
    async fn open_session(&self, consumer_name: &str) -> Result<Box<dyn QueueSession>, IngestError>;
}

/// One worker's consuming connection to the queue.
#[async_trait]
pub trait QueueSession: Send {
    /// Wait up to `timeout` for the next entry.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn pull(&mut self, timeout: Duration) -> Result<Option<QueueEntry>, IngestError>;

    /// Acknowledge a delivered entry so it is never redelivered.
    async fn ack(&mut self, handle: AckHandle) -> Result<(), IngestError>;

    /// Redeliver this consumer's unacknowledged entries before any new ones.
    ///
    /// Restarts from the oldest pending entry, so it must only be called when
    /// the caller holds no unacknowledged handles.
    fn request_redelivery(&mut self);
}

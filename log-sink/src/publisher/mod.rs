//! Publisher module for the log sink.
//!
//! Places index actions on the durable queue for the worker pool to drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log_sink_shared::IndexAction;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

use crate::encoder::IndexRequestEncoder;
use crate::errors::IngestError;
use crate::queue::QueueBroker;

/// How often a transient publish failure is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Publishes index actions to the queue.
///
/// The queue is declared before the first publish and again after any publish
/// failure.
pub struct Publisher {
    broker: Arc<dyn QueueBroker>,
    encoder: IndexRequestEncoder,
    retry: RetryPolicy,
    declared: AtomicBool,
}

impl Publisher {
    /// Create a new publisher.
    pub fn new(broker: Arc<dyn QueueBroker>, encoder: IndexRequestEncoder) -> Self {
        Self {
            broker,
            encoder,
            retry: RetryPolicy::default(),
            declared: AtomicBool::new(false),
        }
    }

    /// Replace the retry policy used by `publish_document`.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn ensure_declared(&self) -> Result<(), IngestError> {
        if self.declared.load(Ordering::Acquire) {
            return Ok(());
        }
        self.broker
            .declare()
            .await
            .map_err(|e| IngestError::publish(format!("failed to declare queue: {}", e)))?;
        self.declared.store(true, Ordering::Release);
        Ok(())
    }

    /// Publish one index action as a single persistent queue entry.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The broker-assigned entry id
    /// * `Err(IngestError::PublishFailure)` - If the broker was unreachable or
    ///   refused the entry
    #[instrument(skip(self, action), fields(document_id = %action.document_id))]
    pub async fn publish(&self, action: &IndexAction) -> Result<String, IngestError> {
        self.ensure_declared().await?;

        let payload = action
            .to_json_bytes()
            .map_err(|e| IngestError::parse(e.to_string()))?;

        match self.broker.enqueue(payload).await {
            Ok(entry_id) => {
                debug!(entry_id = %entry_id, "Published index action");
                Ok(entry_id)
            }
            Err(e) => {
                self.declared.store(false, Ordering::Release);
                Err(IngestError::publish(e.to_string()))
            }
        }
    }

    /// Encode a correlated document and publish it.
    ///
    /// Transient failures are retried according to the retry policy with the
    /// same action, so a retried publish keeps its document id. Malformed
    /// documents are rejected without touching the broker.
    pub async fn publish_document(&self, document: Value) -> Result<IndexAction, IngestError> {
        let action = self.encoder.encode(document)?;

        let mut attempt = 1;
        loop {
            match self.publish(&action).await {
                Ok(_) => return Ok(action),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        error = %e,
                        attempt = attempt,
                        max_attempts = self.retry.max_attempts,
                        "Publish failed, retrying"
                    );
                    sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//! Loader module for the log sink.
//!
//! Groups pulled index actions into chunks, writes each chunk with one bulk
//! request and acknowledges exactly the queue entries that were written.

mod reconcile;

use std::sync::Arc;

use log_sink_repository::BulkIndexProvider;
use log_sink_shared::IndexAction;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::IngestError;
use crate::queue::QueueConsumer;
use crate::supervisor::PipelineStats;

pub use reconcile::{reconcile, ReconcilePlan, RejectedEntry};

/// Outcome of one flushed chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Actions submitted in the bulk request.
    pub submitted: usize,
    /// Queue entries acknowledged.
    pub acknowledged: usize,
    /// Queue entries left unacknowledged for redelivery.
    pub unacknowledged: usize,
}

/// Result of one fill-and-flush cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// A chunk was written.
    Flushed(FlushReport),
    /// The pull timed out with an empty chunk; the backend was not contacted.
    Idle,
    /// Shutdown was requested. Any partial chunk was left for redelivery.
    Shutdown,
}

/// Drives one consumer into the bulk backend.
///
/// A chunk is flushed when it reaches `bulk_size` actions, or when a pull times
/// out with at least one action buffered. An empty chunk is never submitted.
pub struct BulkFlushEngine {
    worker_id: usize,
    consumer: QueueConsumer,
    provider: Arc<dyn BulkIndexProvider>,
    bulk_size: usize,
    chunk: Vec<IndexAction>,
    stats: Arc<PipelineStats>,
}

impl BulkFlushEngine {
    /// Create a new engine.
    ///
    /// # Arguments
    ///
    /// * `worker_id` - Index of the owning worker, used in logs
    /// * `consumer` - Source of actions; its pull timeout is the bulk timeout
    /// * `provider` - Bulk backend
    /// * `bulk_size` - Maximum actions per bulk request
    /// * `stats` - Counters shared with the pool
    pub fn new(
        worker_id: usize,
        consumer: QueueConsumer,
        provider: Arc<dyn BulkIndexProvider>,
        bulk_size: usize,
        stats: Arc<PipelineStats>,
    ) -> Self {
        let bulk_size = bulk_size.max(1);
        Self {
            worker_id,
            consumer,
            provider,
            bulk_size,
            chunk: Vec::with_capacity(bulk_size),
            stats,
        }
    }

    /// Run fill-and-flush cycles until shutdown is requested.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Shutdown was requested
    /// * `Err(IngestError)` - The session or the bulk request failed; every
    ///   unacknowledged entry is left for redelivery and the caller should
    ///   reconnect
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<(), IngestError> {
        loop {
            match self.run_chunk(shutdown).await? {
                ChunkOutcome::Shutdown => return Ok(()),
                ChunkOutcome::Flushed(_) | ChunkOutcome::Idle => {}
            }
        }
    }

    /// Fill one chunk and flush it.
    ///
    /// A pull in progress is abandoned when shutdown is requested. An in-flight
    /// bulk request is not.
    pub async fn run_chunk(
        &mut self,
        shutdown: &CancellationToken,
    ) -> Result<ChunkOutcome, IngestError> {
        loop {
            let pulled = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.abandon_chunk("shutdown requested");
                    return Ok(ChunkOutcome::Shutdown);
                }
                pulled = self.consumer.pull() => pulled,
            };

            match pulled {
                Ok(Some(action)) => {
                    self.stats.record_pulled();
                    self.chunk.push(action);
                    if self.chunk.len() >= self.bulk_size {
                        return self.flush().await.map(ChunkOutcome::Flushed);
                    }
                }
                Ok(None) if self.chunk.is_empty() => {
                    debug!(worker_id = self.worker_id, "No messages within bulk timeout");
                    return Ok(ChunkOutcome::Idle);
                }
                Ok(None) => return self.flush().await.map(ChunkOutcome::Flushed),
                Err(e) => {
                    self.abandon_chunk("pull failed");
                    return Err(e);
                }
            }
        }
    }

    /// Submit the buffered chunk and acknowledge the entries that were written.
    ///
    /// Acknowledgments are sent oldest first. Entries that failed, or whose
    /// outcome cannot be attributed, are left unacknowledged and the session
    /// is asked to redeliver them.
    #[instrument(skip(self), fields(worker_id = self.worker_id, chunk_size = self.chunk.len()))]
    pub async fn flush(&mut self) -> Result<FlushReport, IngestError> {
        if self.chunk.is_empty() {
            return Ok(FlushReport::default());
        }

        let chunk = std::mem::take(&mut self.chunk);
        self.chunk.reserve(self.bulk_size);
        self.stats.record_submitted(chunk.len());

        let summary = match self.provider.bulk_write(&chunk).await {
            Ok(summary) => summary,
            Err(e) => {
                let dropped = self.consumer.abandon_pending();
                self.stats.record_failed(dropped);
                error!(
                    error = %e,
                    unacknowledged = dropped,
                    "Bulk request failed, leaving chunk for redelivery"
                );
                return Err(e.into());
            }
        };

        let plan = reconcile(self.consumer.pending_mut(), &summary);

        if let Some(position) = plan.diverged_at {
            error!(
                position = position,
                submitted = chunk.len(),
                results = summary.results.len(),
                unattributed = plan.unattributed,
                "Bulk results do not line up with the chunk, leaving the rest for redelivery"
            );
        }
        for rejected in &plan.rejected {
            warn!(
                document_id = %rejected.document_id,
                status = rejected.status,
                error = rejected.error.as_deref().unwrap_or("unknown"),
                "Document rejected, leaving it for redelivery"
            );
        }

        let needs_redelivery = plan.needs_redelivery();
        let unacknowledged = plan.rejected.len() + plan.unattributed;
        self.stats.record_failed(unacknowledged);

        let mut acknowledged = 0;
        for handle in plan.acknowledge {
            self.consumer.acknowledge(handle).await?;
            acknowledged += 1;
            self.stats.record_acknowledged(1);
        }

        if needs_redelivery {
            self.consumer.request_redelivery();
        }

        let report = FlushReport {
            submitted: chunk.len(),
            acknowledged,
            unacknowledged,
        };

        info!(
            submitted = report.submitted,
            acknowledged = report.acknowledged,
            unacknowledged = report.unacknowledged,
            "Flushed chunk"
        );

        Ok(report)
    }

    fn abandon_chunk(&mut self, reason: &str) {
        if self.chunk.is_empty() && self.consumer.pending().is_empty() {
            return;
        }
        let buffered = self.chunk.len();
        self.chunk.clear();
        let dropped = self.consumer.abandon_pending();
        debug!(
            worker_id = self.worker_id,
            buffered = buffered,
            unacknowledged = dropped,
            reason = reason,
            "Abandoned partial chunk"
        );
    }
}

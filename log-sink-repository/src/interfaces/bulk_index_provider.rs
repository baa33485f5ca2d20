//! Bulk index provider trait definition.
//!
//! This module defines the abstract interface for bulk-write operations,
//! allowing for different backend implementations (OpenSearch, Elasticsearch, etc.).

use async_trait::async_trait;
use log_sink_shared::IndexAction;

use crate::errors::BulkIndexError;
use crate::types::BulkWriteSummary;

/// Abstracts the underlying search backend used by the bulk flush engine.
///
/// Implementations are shared by every worker in the pool, so they must be
/// `Send + Sync` and safe to call concurrently.
///
/// # Result ordering
///
/// `bulk_write` must return one result per submitted action, in submission
/// order. The flush engine pairs results with queue messages by position, so an
/// implementation that cannot guarantee this must return an error instead of a
/// reordered or truncated result list.
#[async_trait]
pub trait BulkIndexProvider: Send + Sync {
    /// Check that the backend is reachable.
    ///
    /// Called once during application startup.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the backend answered
    /// * `Err(BulkIndexError)` - If the backend could not be reached
    async fn ensure_ready(&self) -> Result<(), BulkIndexError>;

    /// Write a chunk of actions as a single bulk request.
    ///
    /// # Arguments
    ///
    /// * `actions` - The chunk to submit, in pull order
    ///
    /// # Returns
    ///
    /// * `Ok(BulkWriteSummary)` - Aggregate statistics and the ordered per-action results
    /// * `Err(BulkIndexError)` - If the request as a whole failed; no action in the
    ///   chunk may be assumed written
    async fn bulk_write(&self, actions: &[IndexAction]) -> Result<BulkWriteSummary, BulkIndexError>;
}

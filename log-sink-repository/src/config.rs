//! Configuration types for bulk-write providers.

use std::time::Duration;

/// Configuration for a `BulkIndexProvider` implementation.
///
/// Controls how chunks are expressed to the backend and guards against sending
/// overly large bulk requests.
#[derive(Debug, Clone)]
pub struct BulkIndexConfig {
    /// Maximum number of actions allowed in a single bulk request.
    ///
    /// Set to `None` to disable the limit. Defaults to 1000.
    pub max_batch_size: Option<usize>,
    /// Emit `_type` and `_ttl` in each action header.
    ///
    /// Only clusters that still support mapping types and per-document TTL
    /// (Elasticsearch before 6.0) accept these fields. Defaults to `false`.
    pub legacy_metadata: bool,
    /// Per-request timeout for bulk calls. `None` uses the transport default.
    pub request_timeout: Option<Duration>,
}

impl Default for BulkIndexConfig {
    fn default() -> Self {
        Self {
            max_batch_size: Some(1000),
            legacy_metadata: false,
            request_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl BulkIndexConfig {
    /// Create a config with a custom batch size limit.
    ///
    /// # Arguments
    ///
    /// * `max_batch_size` - Maximum number of actions allowed in a single bulk request
    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            max_batch_size: Some(max_batch_size),
            ..Self::default()
        }
    }

    /// Enable or disable legacy `_type`/`_ttl` header fields.
    pub fn legacy_metadata(mut self, enabled: bool) -> Self {
        self.legacy_metadata = enabled;
        self
    }

    /// Check a chunk size against the configured limit.
    pub fn validate_batch_size(&self, size: usize) -> Result<(), crate::BulkIndexError> {
        if let Some(max) = self.max_batch_size {
            if size > max {
                return Err(crate::BulkIndexError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }
}

//! Bulk index error types.
//!
//! This module defines the unified error type for all bulk-write operations,
//! including both transport failures and malformed backend responses.

use thiserror::Error;

/// Unified errors from bulk-write operations.
///
/// Used by the `BulkIndexProvider` trait. Per-action failures reported inside a
/// successful bulk response are NOT errors at this level; they are carried in
/// `BulkItemResult`. This type covers the cases where the request as a whole
/// could not be completed.
#[derive(Debug, Clone, Error)]
pub enum BulkIndexError {
    /// Failed to reach the search backend, or the connection dropped mid-request.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend rejected the bulk request as a whole.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to parse the response from the search backend.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Batch size exceeds configured maximum.
    #[error("Batch size {provided} exceeds maximum {max}")]
    BatchSizeExceeded { provided: usize, max: usize },
}

impl BulkIndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a batch size exceeded error.
    pub fn batch_size_exceeded(provided: usize, max: usize) -> Self {
        Self::BatchSizeExceeded { provided, max }
    }

    /// Whether the error means the backend could not be reached.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = BulkIndexError::batch_size_exceeded(12, 10);
        assert_eq!(err.to_string(), "Batch size 12 exceeds maximum 10");
    }

    #[test]
    fn test_is_connection() {
        assert!(BulkIndexError::connection("refused").is_connection());
        assert!(!BulkIndexError::parse("bad json").is_connection());
    }
}

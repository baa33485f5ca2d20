//! Error types for the log sink repository.
//!
//! This module provides a unified error type for all bulk-write operations.

mod bulk_index_error;

pub use bulk_index_error::BulkIndexError;

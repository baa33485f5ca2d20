//! # Log Sink Repository
//!
//! This crate provides the backend seam used by the log sink's bulk flush
//! engine. It includes definitions for errors, the `BulkIndexProvider`
//! interface, and a concrete implementation for OpenSearch.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod types;
pub mod utils;

pub use config::BulkIndexConfig;
pub use errors::BulkIndexError;
pub use interfaces::BulkIndexProvider;
pub use opensearch::OpenSearchProvider;
pub use types::{BulkItemResult, BulkWriteSummary};
pub use utils::{bulk_action_header, parse_bulk_response};

//! OpenSearch implementation of the bulk index provider.
//!
//! This module provides a concrete implementation of `BulkIndexProvider`
//! using the OpenSearch `_bulk` endpoint as the backend.

mod provider;

pub use provider::OpenSearchProvider;

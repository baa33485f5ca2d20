//! Interface definitions for the bulk index provider.
//!
//! This module defines the abstract `BulkIndexProvider` trait that allows
//! for dependency injection and swappable search backend implementations.

mod bulk_index_provider;

pub use bulk_index_provider::BulkIndexProvider;

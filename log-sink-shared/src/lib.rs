//! # Log Sink Shared
//!
//! This crate defines the data structures that travel through the durable queue
//! between the correlation stage and the bulk indexing workers. It includes the
//! `IndexAction` wire document and a read-only view over correlated log documents.

pub mod types;

pub use types::correlated_document::{CorrelatedDocument, ENVELOPE_KEY};
pub use types::index_action::IndexAction;

//! # Log Sink
//!
//! Final stage of a log correlation pipeline: correlated log events are placed
//! on a durable Redis stream and drained by a pool of workers that bulk-index
//! them into OpenSearch.
//!
//! ## Architecture
//!
//! 1. **Encoder**: Routes a correlated document to its tenant's index
//! 2. **Publisher**: Places index actions on the durable queue
//! 3. **Queue**: Delivers actions to workers and tracks unacknowledged entries
//! 4. **Loader**: Writes chunks with one bulk request and acknowledges exactly
//!    the entries that were written
//! 5. **Supervisor**: Runs the worker pool and handles shutdown
//!
//! A queue entry is acknowledged only after the backend confirmed its write.
//! Anything else is redelivered, so delivery is at-least-once.
//!
//! ## Modules
//!
//! - [`config`]: Configuration and dependency initialization
//! - [`encoder`]: Turns correlated documents into index actions
//! - [`publisher`]: Publishes index actions to the queue
//! - [`queue`]: Queue brokers and the consumer
//! - [`loader`]: The bulk flush engine
//! - [`supervisor`]: The worker pool
//! - [`errors`]: Error types for the pipeline

pub mod config;
pub mod encoder;
pub mod errors;
pub mod loader;
pub mod publisher;
pub mod queue;
pub mod supervisor;

pub use config::{Dependencies, SinkConfig};
pub use errors::IngestError;

use thiserror::Error;

/// Errors that can occur during sink initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Ingest error.
    #[error("Ingest error: {0}")]
    IngestError(#[from] IngestError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

//! Error types for the log sink pipeline.

use log_sink_repository::BulkIndexError;
use thiserror::Error;

/// Errors that can occur while publishing, consuming or bulk-writing.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The document lacks the tenant or correlation pattern needed for routing.
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// The broker was unreachable or rejected the message.
    #[error("Publish failure: {0}")]
    PublishFailure(String),

    /// The bulk request as a whole failed.
    #[error("Bulk write failure: {0}")]
    BulkWriteFailure(String),

    /// The broker or backend connection dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The broker answered with an error that is not a dropped connection.
    #[error("Queue error: {0}")]
    QueueError(String),

    /// Error encoding or decoding a queue payload.
    #[error("Parse error: {0}")]
    ParseError(String),
}

impl IngestError {
    /// Create a malformed document error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// Create a publish failure.
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::PublishFailure(msg.into())
    }

    /// Create a bulk write failure.
    pub fn bulk_write(msg: impl Into<String>) -> Self {
        Self::BulkWriteFailure(msg.into())
    }

    /// Create a connection lost error.
    pub fn connection_lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost(msg.into())
    }

    /// Create a queue error.
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::QueueError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Whether the error was caused by a dropped connection.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PublishFailure(_) | Self::ConnectionLost(_))
    }
}

impl From<redis::RedisError> for IngestError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped()
            || err.is_io_error()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Self::connection_lost(err.to_string())
        } else {
            Self::queue(err.to_string())
        }
    }
}

impl From<BulkIndexError> for IngestError {
    fn from(err: BulkIndexError) -> Self {
        if err.is_connection() {
            Self::connection_lost(err.to_string())
        } else {
            Self::bulk_write(err.to_string())
        }
    }
}

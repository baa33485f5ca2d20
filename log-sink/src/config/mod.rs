//! Configuration and dependency initialization for the log sink.

mod dependencies;

pub use dependencies::{ConnectionMode, Dependencies};

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::IndexingError;

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_QUEUE_NAME: &str = "elasticsearch";
const DEFAULT_CONSUMER_PREFIX: &str = "log-sink";
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;
const DEFAULT_BULK_SIZE: usize = 100;
const DEFAULT_BULK_TIMEOUT_SECS: u64 = 60;
/// Thirty days.
const DEFAULT_TTL_SECS: u64 = 2_592_000;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_CLAIM_IDLE_SECS: u64 = 300;

/// Settings for the whole sink, read from the environment.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub redis_url: String,
    pub queue_name: String,
    pub consumer_prefix: String,
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    pub legacy_metadata: bool,
    pub bulk_size: usize,
    pub bulk_timeout: Duration,
    pub document_ttl: Duration,
    pub concurrency: usize,
    pub shutdown_grace: Duration,
    pub reconnect_delay: Duration,
    pub claim_idle: Duration,
}

impl SinkConfig {
    /// Read the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REDIS_URL`: Redis URL (default: redis://127.0.0.1:6379)
    /// - `SINK_QUEUE_NAME`: Stream key and consumer group (default: elasticsearch)
    /// - `SINK_CONSUMER_PREFIX`: Consumer name prefix (default: log-sink)
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `OPENSEARCH_LEGACY_METADATA`: Send `_type`/`_ttl` in bulk headers (default: false)
    /// - `SINK_BULK_SIZE`: Actions per bulk request (default: 100)
    /// - `SINK_BULK_TIMEOUT_SECS`: Idle wait before a partial flush (default: 60)
    /// - `SINK_TTL_SECS`: Document expiry in seconds (default: 2592000)
    /// - `SINK_CONCURRENCY`: Number of workers (default: available parallelism)
    /// - `SINK_SHUTDOWN_GRACE_SECS`: Grace period on shutdown (default: 30)
    /// - `SINK_RECONNECT_DELAY_SECS`: Pause before a worker reconnects (default: 5)
    /// - `SINK_CLAIM_IDLE_SECS`: Idle time before another consumer's pending
    ///   entries are claimed (default: 300)
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let default_concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Ok(Self {
            redis_url: string_or("REDIS_URL", DEFAULT_REDIS_URL),
            queue_name: string_or("SINK_QUEUE_NAME", DEFAULT_QUEUE_NAME),
            consumer_prefix: string_or("SINK_CONSUMER_PREFIX", DEFAULT_CONSUMER_PREFIX),
            opensearch_url: string_or("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            connection_mode: ConnectionMode::parse(lookup("OPENSEARCH_CONNECTION_MODE").as_deref()),
            retry_interval: secs(&lookup, "OPENSEARCH_RETRY_INTERVAL_SECS", DEFAULT_RETRY_INTERVAL_SECS)?,
            legacy_metadata: flag(&lookup, "OPENSEARCH_LEGACY_METADATA")?,
            bulk_size: positive(&lookup, "SINK_BULK_SIZE", DEFAULT_BULK_SIZE)?,
            bulk_timeout: secs(&lookup, "SINK_BULK_TIMEOUT_SECS", DEFAULT_BULK_TIMEOUT_SECS)?,
            document_ttl: secs(&lookup, "SINK_TTL_SECS", DEFAULT_TTL_SECS)?,
            concurrency: positive(&lookup, "SINK_CONCURRENCY", default_concurrency)?,
            shutdown_grace: secs(&lookup, "SINK_SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?,
            reconnect_delay: secs(&lookup, "SINK_RECONNECT_DELAY_SECS", DEFAULT_RECONNECT_DELAY_SECS)?,
            claim_idle: secs(&lookup, "SINK_CLAIM_IDLE_SECS", DEFAULT_CLAIM_IDLE_SECS)?,
        })
    }
}

/// Parse a strictly positive number, falling back to `default` when unset.
fn positive<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IndexingError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(IndexingError::config(format!(
            "{} must be a positive integer, got {:?}",
            key, raw
        ))),
    }
}

fn secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, IndexingError>
where
    F: Fn(&str) -> Option<String>,
{
    positive(lookup, key, default).map(Duration::from_secs)
}

fn flag<F>(lookup: &F, key: &str) -> Result<bool, IndexingError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") | Some("false") | Some("0") | Some("no") => Ok(false),
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some(other) => Err(IndexingError::config(format!(
            "{} must be a boolean, got {:?}",
            key, other
        ))),
    }
}

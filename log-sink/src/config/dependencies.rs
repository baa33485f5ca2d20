//! Dependency initialization and wiring for the log sink.

use std::sync::Arc;
use std::time::Duration;

use log_sink_repository::{BulkIndexConfig, BulkIndexProvider, OpenSearchProvider};
use tokio::time::sleep;
use tracing::{info, warn};

use super::SinkConfig;
use crate::encoder::IndexRequestEncoder;
use crate::publisher::Publisher;
use crate::queue::{QueueBroker, RedisBroker, RedisBrokerConfig};
use crate::supervisor::{PoolConfig, WorkerPool};
use crate::IndexingError;

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry the connection until it succeeds.
    Retry,
}

impl ConnectionMode {
    /// Parse the value of `OPENSEARCH_CONNECTION_MODE`.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive).
    /// Defaults to "retry" if not set or invalid.
    pub(crate) fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("retry").to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!("Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured worker pool, ready to run.
    pub pool: WorkerPool,
    /// Publisher on the same queue, for producers sharing this process.
    pub publisher: Publisher,
}

impl Dependencies {
    /// Initialize all dependencies from environment variables.
    ///
    /// See [`SinkConfig::from_env`] for the variables read.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If the configuration is invalid, Redis is
    ///   unreachable, or OpenSearch is unreachable in fail-fast mode
    pub async fn new() -> Result<Self, IndexingError> {
        let config = SinkConfig::from_env()?;
        Self::from_config(config).await
    }

    /// Initialize all dependencies from an explicit configuration.
    pub async fn from_config(config: SinkConfig) -> Result<Self, IndexingError> {
        info!(
            redis_url = %config.redis_url,
            queue = %config.queue_name,
            opensearch_url = %config.opensearch_url,
            connection_mode = ?config.connection_mode,
            concurrency = config.concurrency,
            bulk_size = config.bulk_size,
            "Initializing dependencies"
        );

        let bulk_config = BulkIndexConfig::with_max_batch_size(config.bulk_size)
            .legacy_metadata(config.legacy_metadata);

        let provider = Self::connect_to_opensearch(
            &config.opensearch_url,
            bulk_config,
            config.connection_mode,
            config.retry_interval,
        )
        .await?;

        info!("OpenSearch connection established");

        let broker = RedisBroker::new(RedisBrokerConfig {
            url: config.redis_url.clone(),
            queue_name: config.queue_name.clone(),
            claim_idle: config.claim_idle,
        })
        .await
        .map_err(|e| IndexingError::config(format!("Failed to connect to Redis: {}", e)))?;
        let broker: Arc<dyn QueueBroker> = Arc::new(broker);

        broker
            .declare()
            .await
            .map_err(|e| IndexingError::config(format!("Failed to declare queue: {}", e)))?;

        info!("Queue declared");

        let publisher = Publisher::new(
            Arc::clone(&broker),
            IndexRequestEncoder::new(config.document_ttl),
        );

        let pool = WorkerPool::new(
            PoolConfig {
                concurrency: config.concurrency,
                bulk_size: config.bulk_size,
                bulk_timeout: config.bulk_timeout,
                consumer_prefix: config.consumer_prefix,
                shutdown_grace: config.shutdown_grace,
                reconnect_delay: config.reconnect_delay,
                ..PoolConfig::default()
            },
            broker,
            Arc::new(provider),
        );

        Ok(Self { pool, publisher })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        bulk_config: BulkIndexConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, IndexingError> {
        loop {
            match Self::try_connect_opensearch(url, bulk_config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Create the provider and check that the cluster answers.
    async fn try_connect_opensearch(
        url: &str,
        bulk_config: BulkIndexConfig,
    ) -> Result<OpenSearchProvider, IndexingError> {
        let provider = OpenSearchProvider::new(url, bulk_config).await.map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch provider: {}", e))
        })?;

        provider
            .ensure_ready()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch is not reachable: {}", e)))?;

        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_mode_parse() {
        assert_eq!(ConnectionMode::parse(None), ConnectionMode::Retry);
        assert_eq!(ConnectionMode::parse(Some("FAIL-FAST")), ConnectionMode::FailFast);
        assert_eq!(ConnectionMode::parse(Some("fail_fast")), ConnectionMode::FailFast);
        assert_eq!(ConnectionMode::parse(Some("bogus")), ConnectionMode::Retry);
    }
}

//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `BulkIndexProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use log_sink_shared::IndexAction;
use opensearch::{
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    BulkParts, OpenSearch,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::BulkIndexConfig;
use crate::errors::BulkIndexError;
use crate::interfaces::BulkIndexProvider;
use crate::types::BulkWriteSummary;
use crate::utils;

/// OpenSearch provider implementation.
///
/// Submits each chunk as one `POST /_bulk` request and reports the per-action
/// outcome in submission order.
///
/// # Example
///
/// ```ignore
/// use log_sink_repository::{BulkIndexConfig, BulkIndexProvider, OpenSearchProvider};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", BulkIndexConfig::default()).await?;
/// provider.ensure_ready().await?;
/// let summary = provider.bulk_write(&actions).await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    config: BulkIndexConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Bulk request configuration
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(BulkIndexError)` - If connection setup fails
    pub async fn new(url: &str, config: BulkIndexConfig) -> Result<Self, BulkIndexError> {
        let parsed_url = Url::parse(url).map_err(|e| BulkIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| BulkIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            max_batch_size = ?config.max_batch_size,
            legacy_metadata = config.legacy_metadata,
            "Created OpenSearch provider"
        );

        Ok(Self { client, config })
    }

    /// Build the newline-delimited bulk body: one header line and one source
    /// line per action.
    fn build_body(&self, actions: &[IndexAction]) -> Vec<JsonBody<Value>> {
        let mut body = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            body.push(JsonBody::new(utils::bulk_action_header(
                action,
                self.config.legacy_metadata,
            )));
            body.push(JsonBody::new(action.payload.clone()));
        }
        body
    }
}

#[async_trait]
impl BulkIndexProvider for OpenSearchProvider {
    async fn ensure_ready(&self) -> Result<(), BulkIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| BulkIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BulkIndexError::connection(format!(
                "Ping failed with status {}",
                status
            )));
        }

        debug!("OpenSearch is reachable");
        Ok(())
    }

    /// Write a chunk of actions with a single `_bulk` request.
    ///
    /// An empty chunk returns an empty summary without contacting the backend.
    /// A response with `errors: true` is still `Ok`; the failing actions are
    /// reported through their `BulkItemResult`.
    #[instrument(skip(self, actions), fields(chunk_size = actions.len()))]
    async fn bulk_write(&self, actions: &[IndexAction]) -> Result<BulkWriteSummary, BulkIndexError> {
        if actions.is_empty() {
            return Ok(BulkWriteSummary::default());
        }

        self.config.validate_batch_size(actions.len())?;

        let body = self.build_body(actions);
        let mut request = self.client.bulk(BulkParts::None).body(body);
        if let Some(timeout) = self.config.request_timeout {
            request = request.request_timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BulkIndexError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(BulkIndexError::bulk_index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BulkIndexError::parse(e.to_string()))?;

        let results = utils::parse_bulk_response(&body)?;
        let summary = BulkWriteSummary::from_results(actions.len(), results);

        if summary.failed > 0 {
            warn!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                "Bulk request completed with some failures"
            );
        } else {
            debug!(count = summary.succeeded, "Bulk request succeeded");
        }

        Ok(summary)
    }
}

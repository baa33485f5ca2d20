//! Index request encoder implementation.
//!
//! Routes a correlated document to its tenant's index and tags it with the
//! correlation pattern that matched it.

use std::time::Duration;

use log_sink_shared::{CorrelatedDocument, IndexAction, ENVELOPE_KEY};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::errors::IngestError;

/// Encoder that transforms correlated documents into index actions.
///
/// Every action gets a fresh document id, so encoding the same document twice
/// yields two distinct actions.
#[derive(Debug, Clone)]
pub struct IndexRequestEncoder {
    expiry: Duration,
}

impl IndexRequestEncoder {
    /// Create an encoder that stamps every action with the given expiry.
    pub fn new(expiry: Duration) -> Self {
        Self { expiry }
    }

    /// The expiry applied to encoded actions.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Encode a single correlated document.
    ///
    /// # Returns
    ///
    /// * `Ok(IndexAction)` - The action carrying the document unchanged as payload
    /// * `Err(IngestError::MalformedDocument)` - If the tenant or the correlation
    ///   pattern is missing or empty
    #[instrument(skip(self, document))]
    pub fn encode(&self, document: Value) -> Result<IndexAction, IngestError> {
        let document = CorrelatedDocument::new(document);

        let tenant = document
            .tenant()
            .ok_or_else(|| {
                IngestError::malformed(format!("missing {}.tenant", ENVELOPE_KEY))
            })?
            .to_string();
        let pattern = document
            .correlation_pattern()
            .ok_or_else(|| {
                IngestError::malformed(format!("missing {}.correlation.pattern", ENVELOPE_KEY))
            })?
            .to_string();

        let action = IndexAction::new(tenant, pattern, self.expiry, document.into_inner());

        debug!(
            document_id = %action.document_id,
            target_collection = %action.target_collection,
            document_type = %action.document_type,
            "Encoded index action"
        );

        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoder() -> IndexRequestEncoder {
        IndexRequestEncoder::new(Duration::from_secs(30 * 24 * 60 * 60))
    }

    #[test]
    fn test_encode_routes_by_tenant_and_pattern() {
        let document = json!({
            "meniscus": {"tenant": "5164", "correlation": {"pattern": "login_failure"}},
            "message": "password rejected"
        });

        let action = encoder().encode(document.clone()).unwrap();

        assert_eq!(action.target_collection, "5164");
        assert_eq!(action.document_type, "login_failure");
        assert_eq!(action.expiry, Duration::from_secs(2_592_000));
        assert_eq!(action.payload, document);
    }

    #[test]
    fn test_encode_accepts_top_level_routing_fields() {
        let document = json!({
            "tenant": "acme",
            "correlation": {"pattern": "disk_full"}
        });

        let action = encoder().encode(document).unwrap();
        assert_eq!(action.target_collection, "acme");
        assert_eq!(action.document_type, "disk_full");
    }

    #[test]
    fn test_encode_uses_field_values_verbatim() {
        let document = json!({
            "meniscus": {"tenant": "Tenant With Spaces", "correlation": {"pattern": "A/B"}}
        });

        let action = encoder().encode(document).unwrap();
        assert_eq!(action.target_collection, "Tenant With Spaces");
        assert_eq!(action.document_type, "A/B");
    }

    #[test]
    fn test_encode_same_document_twice_gives_distinct_ids() {
        let document = json!({
            "meniscus": {"tenant": "t", "correlation": {"pattern": "p"}}
        });

        let first = encoder().encode(document.clone()).unwrap();
        let second = encoder().encode(document).unwrap();
        assert_ne!(first.document_id, second.document_id);
    }

    #[test]
    fn test_encode_rejects_missing_tenant() {
        let document = json!({"meniscus": {"correlation": {"pattern": "p"}}});
        assert!(matches!(
            encoder().encode(document),
            Err(IngestError::MalformedDocument(_))
        ));
    }

    #[test]
    fn test_encode_rejects_empty_pattern() {
        let document = json!({"meniscus": {"tenant": "t", "correlation": {"pattern": ""}}});
        assert!(matches!(
            encoder().encode(document),
            Err(IngestError::MalformedDocument(_))
        ));
    }
}

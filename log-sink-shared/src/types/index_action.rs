//! Index action types.
//!
//! This module defines the document that is placed on the durable queue and later
//! submitted to the search backend's bulk API.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single index request for the search backend.
///
/// The serialized form uses exactly the fields `_index`, `_type`, `_id`, `_ttl`
/// and `_source`, where `_ttl` is the expiry in milliseconds and `_source` is the
/// original correlated document.
///
/// # Document identifiers
///
/// `document_id` is a fresh random token generated each time an action is
/// created. It travels inside the queued payload, so a redelivered message or a
/// retried publish carries the same id and overwrites the earlier copy instead
/// of creating a duplicate document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexAction {
    /// The index the document is written to (the tenant).
    #[serde(rename = "_index")]
    pub target_collection: String,
    /// The document type (the correlation pattern).
    #[serde(rename = "_type")]
    pub document_type: String,
    /// Unique document identifier.
    #[serde(rename = "_id")]
    pub document_id: String,
    /// How long the document should live in the index.
    #[serde(rename = "_ttl", with = "expiry_millis")]
    pub expiry: Duration,
    /// The correlated log document, unchanged.
    #[serde(rename = "_source")]
    pub payload: Value,
}

impl IndexAction {
    /// Create a new index action with a freshly generated document id.
    ///
    /// # Arguments
    ///
    /// * `target_collection` - Index to write into
    /// * `document_type` - Document type recorded alongside the payload
    /// * `expiry` - Document time-to-live
    /// * `payload` - The document body
    ///
    /// # Example
    ///
    /// ```
    /// use log_sink_shared::IndexAction;
    /// use serde_json::json;
    /// use std::time::Duration;
    ///
    /// let action = IndexAction::new(
    ///     "tenant-1",
    ///     "login_failure",
    ///     Duration::from_secs(3600),
    ///     json!({"message": "denied"}),
    /// );
    /// assert_eq!(action.target_collection, "tenant-1");
    /// ```
    pub fn new(
        target_collection: impl Into<String>,
        document_type: impl Into<String>,
        expiry: Duration,
        payload: Value,
    ) -> Self {
        Self {
            target_collection: target_collection.into(),
            document_type: document_type.into(),
            document_id: Uuid::new_v4().to_string(),
            expiry,
            payload,
        }
    }

    /// Serialize the action into its JSON queue representation.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode an action from its JSON queue representation.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

mod expiry_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(expiry: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(expiry.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

//! Correlated log documents.
//!
//! A correlated document is the JSON log event produced by the correlation stage.
//! Its routing fields normally live inside the `meniscus` envelope; documents that
//! carry them at the top level are accepted as well.

use serde_json::Value;

/// Name of the envelope object that carries routing metadata.
pub const ENVELOPE_KEY: &str = "meniscus";

/// Read-only view over a correlated log document.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatedDocument {
    document: Value,
}

impl CorrelatedDocument {
    /// Wrap a JSON document.
    pub fn new(document: Value) -> Self {
        Self { document }
    }

    /// The tenant the document belongs to, if present and non-empty.
    pub fn tenant(&self) -> Option<&str> {
        self.routing_field(&["tenant"])
    }

    /// The correlation pattern that matched the document, if present and non-empty.
    pub fn correlation_pattern(&self) -> Option<&str> {
        self.routing_field(&["correlation", "pattern"])
    }

    /// Borrow the underlying JSON document.
    pub fn as_value(&self) -> &Value {
        &self.document
    }

    /// Consume the view and return the underlying JSON document.
    pub fn into_inner(self) -> Value {
        self.document
    }

    fn routing_field(&self, path: &[&str]) -> Option<&str> {
        self.document
            .get(ENVELOPE_KEY)
            .and_then(|envelope| lookup_str(envelope, path))
            .or_else(|| lookup_str(&self.document, path))
    }
}

impl From<Value> for CorrelatedDocument {
    fn from(document: Value) -> Self {
        Self::new(document)
    }
}

fn lookup_str<'a>(root: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(root, |node, key| node.get(*key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_fields_from_envelope() {
        let doc = CorrelatedDocument::new(json!({
            "meniscus": {
                "tenant": "5164",
                "correlation": {"pattern": "auth_failure"}
            },
            "msg": "denied"
        }));

        assert_eq!(doc.tenant(), Some("5164"));
        assert_eq!(doc.correlation_pattern(), Some("auth_failure"));
    }

    #[test]
    fn test_routing_fields_at_top_level() {
        let doc = CorrelatedDocument::new(json!({
            "tenant": "acme",
            "correlation": {"pattern": "disk_full"}
        }));

        assert_eq!(doc.tenant(), Some("acme"));
        assert_eq!(doc.correlation_pattern(), Some("disk_full"));
    }

    #[test]
    fn test_missing_and_empty_fields() {
        let doc = CorrelatedDocument::new(json!({
            "meniscus": {"tenant": "", "correlation": {}}
        }));

        assert_eq!(doc.tenant(), None);
        assert_eq!(doc.correlation_pattern(), None);
    }

    #[test]
    fn test_non_string_values_are_absent() {
        let doc = CorrelatedDocument::new(json!({
            "meniscus": {"tenant": 42, "correlation": {"pattern": ["x"]}}
        }));

        assert_eq!(doc.tenant(), None);
        assert_eq!(doc.correlation_pattern(), None);
    }
}

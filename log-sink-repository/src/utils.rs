//! Utility functions for building bulk requests and reading bulk responses.

use log_sink_shared::IndexAction;
use serde_json::{json, Map, Value};

use crate::errors::BulkIndexError;
use crate::types::BulkItemResult;

/// Build the `index` header line for one action of a bulk request.
///
/// # Arguments
///
/// * `action` - The action being submitted
/// * `legacy_metadata` - Also emit `_type` and `_ttl` (milliseconds)
///
/// # Example
///
/// ```
/// use log_sink_repository::bulk_action_header;
/// use log_sink_shared::IndexAction;
/// use serde_json::json;
/// use std::time::Duration;
///
/// let action = IndexAction::new("tenant", "pattern", Duration::from_secs(1), json!({}));
/// let header = bulk_action_header(&action, false);
/// assert_eq!(header["index"]["_index"], "tenant");
/// ```
pub fn bulk_action_header(action: &IndexAction, legacy_metadata: bool) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(action.target_collection));
    meta.insert("_id".to_string(), json!(action.document_id));
    if legacy_metadata {
        meta.insert("_type".to_string(), json!(action.document_type));
        let ttl_ms = u64::try_from(action.expiry.as_millis()).unwrap_or(u64::MAX);
        meta.insert("_ttl".to_string(), json!(ttl_ms));
    }
    json!({ "index": meta })
}

/// Parse the body of a bulk response into ordered per-action results.
///
/// Each entry of the `items` array holds a single object keyed by the operation
/// type (`index`, `create`, ...). The order of `items` matches the order of the
/// submitted actions.
///
/// # Returns
///
/// * `Ok(Vec<BulkItemResult>)` - One result per item, in response order
/// * `Err(BulkIndexError)` - If the body has no `items` array or an item is malformed
pub fn parse_bulk_response(body: &Value) -> Result<Vec<BulkItemResult>, BulkIndexError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BulkIndexError::parse("bulk response has no items array"))?;

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let outcome = item
                .as_object()
                .and_then(|operation| operation.values().next())
                .ok_or_else(|| {
                    BulkIndexError::parse(format!("bulk response item {} is malformed", position))
                })?;
            Ok(parse_item(outcome))
        })
        .collect()
}

fn parse_item(outcome: &Value) -> BulkItemResult {
    let document_id = outcome
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = outcome
        .get("status")
        .and_then(Value::as_u64)
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(0);
    let error = outcome.get("error").map(describe_error);
    let success = error.is_none() && (200..300).contains(&status);

    BulkItemResult {
        document_id,
        status,
        success,
        error,
    }
}

fn describe_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{}: {}", kind, reason),
        (Some(kind), None) => kind.to_string(),
        _ => error.to_string(),
    }
}

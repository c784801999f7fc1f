//! Shared helpers for the Google API modules

use serde_json::Value;

/// Extract an array field from a JSON response, returning an empty vec if missing.
///
/// Lists come back under varying field names ("items", "threads", "values").
pub fn extract_array(response: &Value, field: &str) -> Vec<Value> {
    response
        .get(field)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Percent-encode one URL path segment (calendar ids, spreadsheet ids, A1 ranges).
pub fn path_segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

//! Record store boundary.
//!
//! The store exposes each table as a collection addressable by offset and
//! limit, with no joins or aggregation. Everything above this module works
//! against the `RecordSource` trait so the engine can be driven by the HTTP
//! client in production and by in-memory sources in tests.
//!
//! Modules:
//! - http: reqwest client for the REST store

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::SyncError;

/// One page request against the record store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch up to `limit` raw records of `endpoint` starting at `offset`.
    ///
    /// Returns the raw payload. A payload that is not a collection is not an
    /// error at this boundary; `page_records` turns it into zero records.
    async fn fetch_page(
        &self,
        endpoint: &str,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Value, SyncError>;
}

/// Normalize a raw page payload into its records.
///
/// Accepts a bare array, or an object wrapping the array under `data` or
/// `records`. Anything else (error objects, null, scalars) is an empty page.
pub fn page_records(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("records")) {
            Some(Value::Array(items)) => items,
            _ => {
                log::debug!("Record store returned a non-collection page; treating as empty");
                Vec::new()
            }
        },
        Value::Null => Vec::new(),
        other => {
            log::debug!(
                "Record store returned a scalar page ({}); treating as empty",
                type_name(&other)
            );
            Vec::new()
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode raw rows into typed records. Rows that don't fit the record shape
/// are skipped; the number skipped is returned alongside.
pub fn decode_records<T: DeserializeOwned>(endpoint: &str, rows: Vec<Value>) -> (Vec<T>, usize) {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
        match serde_json::from_value::<T>(row) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                log::debug!("Skipping malformed {} row: {}", endpoint, e);
            }
        }
    }
    if skipped > 0 {
        log::info!("{}: skipped {} malformed rows", endpoint, skipped);
    }
    (records, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Client;
    use serde_json::json;

    #[test]
    fn test_array_page_passes_through() {
        let rows = page_records(json!([{ "ID": 1 }, { "ID": 2 }]));
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_wrapped_page_is_unwrapped() {
        assert_eq!(page_records(json!({ "data": [1, 2, 3] })).len(), 3);
        assert_eq!(page_records(json!({ "records": [1] })).len(), 1);
    }

    #[test]
    fn test_malformed_pages_are_empty() {
        assert!(page_records(json!({ "error": "table locked" })).is_empty());
        assert!(page_records(json!({ "data": "oops" })).is_empty());
        assert!(page_records(Value::Null).is_empty());
        assert!(page_records(json!("<html>502</html>")).is_empty());
    }

    #[test]
    fn test_decode_skips_bad_rows() {
        let rows = vec![
            json!({ "ID": "c1", "FECHA_CREACION": 100, "ESTADO": "NUEVO" }),
            json!({ "ID": "c2" }),
            json!("garbage"),
        ];
        let (clients, skipped) = decode_records::<Client>("clients", rows);
        assert_eq!(clients.len(), 1);
        assert_eq!(skipped, 2);
    }
}

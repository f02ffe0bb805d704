//! Row decoding for the read path.
//!
//! Columns holding structured values are stored as JSON text. Decoding
//! attempts to parse every textual value back into structured form; parse
//! failure is the expected path for genuinely scalar columns and keeps the
//! stored scalar unchanged. Decoding never errors and is idempotent.

use crate::Row;
use rusqlite::types::ValueRef;
use serde_json::Value;

/// Materialize every textual field of `row` that parses as JSON.
pub fn decode_row(row: &mut Row) {
    for value in row.values_mut() {
        decode_value(value);
    }
}

/// Materialize a single value in place if it is JSON text.
pub fn decode_value(value: &mut Value) {
    if let Value::String(text) = value {
        if let Ok(parsed) = serde_json::from_str::<Value>(text) {
            *value = parsed;
        }
    }
}

/// Convert a stored SQLite scalar into its JSON representation.
///
/// Blobs are read as lossy UTF-8: the write path never stores raw blobs, so
/// any encountered here were written by another client.
pub(crate) fn scalar_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}

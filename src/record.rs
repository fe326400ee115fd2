//! Record types shared across the pipeline.
//!
//! Raw and transformed records are both ordered maps of field name to
//! JSON scalar. `serde_json` is built with `preserve_order` so records
//! keep their source field order end to end.

use serde_json::Value;

/// A raw record as produced by a source connector: source field name to
/// source-native scalar (string, number, boolean, or null).
pub type RawRecord = serde_json::Map<String, Value>;

/// A record shaped for the destination: column name to destination-typed
/// value. Absent optional columns are omitted, never set to null.
pub type TransformedRecord = serde_json::Map<String, Value>;

/// Returns true for values that count as "empty" for sparse updates:
/// null and the empty string. Such fields are stripped from write
/// payloads so an update never overwrites a populated destination value
/// with emptiness.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

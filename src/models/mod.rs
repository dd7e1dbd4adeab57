//! Data models for Herald entities
//!
//! Store records are decoded leniently: a missing or mistyped field falls
//! back to its zero value so that one bad record never poisons a snapshot.

mod message;
mod organization;
mod user;

pub use message::*;
pub use organization::*;
pub use user::*;

use serde_json::Value;

/// String field with empty-string fallback.
pub(crate) fn str_field(v: &Value, key: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Integer field, accepting either a JSON number or a stringified number.
/// Some store SDKs serialize large integers as strings.
pub(crate) fn int_field(v: &Value, key: &str) -> i64 {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    }
}

/// String-array field; non-string elements are skipped.
pub(crate) fn str_list(v: &Value, key: &str) -> Vec<String> {
    v.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

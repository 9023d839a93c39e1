//! PropertyMap and the `safe_decode` policy for persisted JSON columns.
//!
//! Corrupted-JSON invariant (§4.5): a decode failure of `labels` or
//! `properties` — malformed text, wrong JSON shape, truncation, stray tokens —
//! is never a fatal error. It falls back to `[]` / `{}` respectively.

use std::collections::HashMap;

use super::Value;

pub type PropertyMap = HashMap<String, Value>;

/// Decode a persisted `labels` column. Returns `[]` on any failure, per the
/// storage layer's corrupted-JSON policy.
pub fn safe_decode_labels(raw: &str) -> Vec<String> {
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_default()
}

/// Decode a persisted `properties` column. Returns `{}` on any failure.
pub fn safe_decode_properties(raw: &str) -> PropertyMap {
    serde_json::from_str::<PropertyMap>(raw).unwrap_or_default()
}

pub fn encode_labels(labels: &[String]) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string())
}

pub fn encode_properties(props: &PropertyMap) -> String {
    serde_json::to_string(props).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_labels_fall_back_to_empty() {
        for bad in ["not json", "{\"a\":1}", "[1,2,", "", "null"] {
            assert!(safe_decode_labels(bad).is_empty(), "input: {bad:?}");
        }
    }

    #[test]
    fn malformed_properties_fall_back_to_empty_map() {
        for bad in ["not json", "[1,2,3]", "{unquoted: 1}", "", "undefined"] {
            assert!(safe_decode_properties(bad).is_empty(), "input: {bad:?}");
        }
    }

    #[test]
    fn well_formed_roundtrips() {
        let labels = vec!["Person".to_string(), "Employee".to_string()];
        assert_eq!(safe_decode_labels(&encode_labels(&labels)), labels);
    }
}

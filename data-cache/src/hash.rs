//! Content digests for cached values.

use crate::error::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of the JSON form of `data`.
///
/// Object keys are sorted before hashing, so two values that differ only in
/// key insertion order produce the same digest.
pub fn content_hash<T: Serialize + ?Sized>(data: &T) -> Result<String> {
    let canonical = canonicalize(serde_json::to_value(data)?);
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_digest() {
        // sha256 of `{"a":1}`
        assert_eq!(
            content_hash(&json!({"a": 1})).unwrap(),
            "015abd7f5cc57a2dd94b7590f04ad8084273905ee33ec5cebeae62276a97f862"
        );
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("b".into(), json!(2));
        first.insert("a".into(), json!({"y": 1, "x": [1, 2]}));
        let mut second = Map::new();
        second.insert("a".into(), json!({"x": [1, 2], "y": 1}));
        second.insert("b".into(), json!(2));

        assert_eq!(content_hash(&first).unwrap(), content_hash(&second).unwrap());
    }

    #[test]
    fn test_different_values_differ() {
        assert_ne!(
            content_hash(&json!([1, 2])).unwrap(),
            content_hash(&json!([2, 1])).unwrap()
        );
        assert_ne!(content_hash("1").unwrap(), content_hash(&1).unwrap());
    }
}

//! Deterministic JSON serialization and content hashing.
//!
//! Canonical form serializes object keys in lexicographic order, recursively,
//! while arrays keep their order and scalars render as standard JSON. Two
//! structurally equal values always produce the same bytes, which makes the
//! form safe to hash for idempotency checks and content addressing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Sentinel `content_hash` carried by tombstone versions.
pub const TOMBSTONE_CONTENT_HASH: &str = "tombstone";

/// Serialize a value with recursively sorted object keys.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Value's Display renders compact JSON, which gives us
                // correct string escaping without a fallible serializer.
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Content hash of an entry: SHA-256 over `"<path>:<canonical value>"`.
pub fn content_hash(path: &str, value: &Value) -> String {
    sha256_hex(format!("{path}:{}", canonical_json(value)).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_keys_are_sorted() {
        let a = json!({"b": 2, "a": 1});
        let b = json!({"a": 1, "b": 2});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"a":1,"b":2}"#);
    }

    #[test]
    fn test_nested_objects_sort_recursively() {
        let v = json!({"z": {"y": 1, "x": [{"b": true, "a": null}]}, "a": "s"});
        assert_eq!(canonical_json(&v), r#"{"a":"s","z":{"x":[{"a":null,"b":true}],"y":1}}"#);
    }

    #[test]
    fn test_arrays_preserve_order() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonical_json(&v), "[3,1,2]");
    }

    #[test]
    fn test_string_escaping_survives() {
        let v = json!({"quote\"key": "line\nbreak"});
        let rendered = canonical_json(&v);
        let parsed: Value = serde_json::from_str(&rendered).expect("canonical form is valid JSON");
        assert_eq!(parsed, v);
    }

    #[test]
    fn test_content_hash_is_stable_across_key_order() {
        let h1 = content_hash("/x/y", &json!({"n": 1, "m": 2}));
        let h2 = content_hash("/x/y", &json!({"m": 2, "n": 1}));
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_content_hash_depends_on_path() {
        let v = json!({"n": 1});
        assert_ne!(content_hash("/a", &v), content_hash("/b", &v));
    }
}

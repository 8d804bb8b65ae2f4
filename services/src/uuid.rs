//! Deterministic identifiers for vector-store points.
//!
//! A record's point id is derived from its content so that re-loading the same
//! document produces the same id and an upsert overwrites instead of
//! duplicating. Object keys are sorted before hashing, which makes the id
//! independent of field insertion order and of serde_json's map backend.

use serde_json::Value;
use uuid::Uuid;

/// Deterministic UUIDv5 from an arbitrary string id.
pub fn stable_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
}

/// Deterministic UUIDv5 from a JSON payload, canonicalized with sorted keys.
pub fn content_uuid(payload: &Value) -> Uuid {
    stable_uuid(&canonical_json(payload))
}

/// Compact JSON rendering with object keys in ascending byte order.
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
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Keys are plain strings; serde_json handles escaping.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
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

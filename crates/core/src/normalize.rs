//! Canonical JSON.
//!
//! Used wherever two JSON payloads must compare equal regardless of how they
//! were built: cache keys for filtered queries and dirty checks on drafts.

use serde_json::{Map, Value};

/// Canonicalize a JSON value.
///
/// - object keys are sorted
/// - object members whose value is `null` are dropped
/// - strings are trimmed
///
/// Arrays keep their order. The operation is idempotent:
/// `normalize(&normalize(v)) == normalize(v)`.
#[must_use]
pub fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut out = Map::with_capacity(entries.len());
            for (key, v) in entries {
                out.insert(key.clone(), normalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}

/// Compact string form of [`normalize`], suitable as a cache key.
///
/// Keys are written in sorted order even if `serde_json` is built with
/// `preserve_order`.
#[must_use]
pub fn canonical_key(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&normalize(value), &mut out);
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
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(v) = map.get(key) {
                    write_canonical(v, out);
                }
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

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_idempotent() {
        let value = json!({
            "b": { "z": " padded ", "a": null, "m": [ { "y": 1, "x": null } ] },
            "a": "  hi",
            "c": null
        });
        let once = normalize(&value);
        let twice = normalize(&once);
        assert_eq!(once, twice);
        assert_eq!(canonical_key(&once), canonical_key(&value));
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let mut left = Map::new();
        left.insert("category".into(), json!("gpu"));
        left.insert("max_price".into(), json!(5000));
        left.insert("condition".into(), json!("good"));

        let mut right = Map::new();
        right.insert("condition".into(), json!("good"));
        right.insert("category".into(), json!("gpu"));
        right.insert("max_price".into(), json!(5000));

        let left = Value::Object(left);
        let right = Value::Object(right);
        assert_eq!(normalize(&left), normalize(&right));
        assert_eq!(canonical_key(&left), canonical_key(&right));
    }

    #[test]
    fn test_drops_nulls_and_trims() {
        let value = json!({ "q": " rtx 3080 ", "seller": null, "tags": [" a ", null] });
        assert_eq!(
            normalize(&value),
            json!({ "q": "rtx 3080", "tags": ["a", null] })
        );
    }

    #[test]
    fn test_canonical_key_is_compact_and_sorted() {
        let value = json!({ "b": 2, "a": [1, "x"], "c": { "e": true, "d": null } });
        assert_eq!(canonical_key(&value), r#"{"a":[1,"x"],"b":2,"c":{"e":true}}"#);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(normalize(&json!(42)), json!(42));
        assert_eq!(normalize(&json!(true)), json!(true));
        assert_eq!(normalize(&Value::Null), Value::Null);
    }
}

//! Delta computation and content checksums.
//!
//! These functions are pure. They let the engine send and validate partial
//! updates when delta sync is enabled instead of always transmitting full
//! values.

use driftsync_types::{Delta, FieldDelta};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Compute the difference that turns `old` into `new`.
///
/// Objects are compared one level deep: a field is `Add`ed when only `new`
/// has it, `Change`d when both have it with values that differ by deep
/// equality, and `Remove`d when only `old` has it. Nested objects are not
/// diffed recursively; a changed nested object is one `Change`.
///
/// When either side is not an object the result is a whole-value
/// [`Delta::Replace`].
pub fn calculate_delta(old: &Value, new: &Value) -> Delta {
    let (Value::Object(old_fields), Value::Object(new_fields)) = (old, new) else {
        return Delta::Replace(new.clone());
    };

    let mut fields = BTreeMap::new();

    for (key, new_value) in new_fields {
        match old_fields.get(key) {
            None => {
                fields.insert(
                    key.clone(),
                    FieldDelta::Add {
                        value: new_value.clone(),
                    },
                );
            }
            Some(old_value) if old_value != new_value => {
                fields.insert(
                    key.clone(),
                    FieldDelta::Change {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            Some(_) => {}
        }
    }

    for (key, old_value) in old_fields {
        if !new_fields.contains_key(key) {
            fields.insert(
                key.clone(),
                FieldDelta::Remove {
                    old: old_value.clone(),
                },
            );
        }
    }

    Delta::Fields(fields)
}

/// Rebuild a value by applying `delta` to `base`.
///
/// Field operations applied to a non-object base start from an empty object.
pub fn apply_delta(base: &Value, delta: &Delta) -> Value {
    match delta {
        Delta::Replace(value) => value.clone(),
        Delta::Fields(fields) => {
            let mut result = match base {
                Value::Object(map) => map.clone(),
                _ => Map::new(),
            };
            for (key, change) in fields {
                match change {
                    FieldDelta::Add { value } | FieldDelta::Change { new: value, .. } => {
                        result.insert(key.clone(), value.clone());
                    }
                    FieldDelta::Remove { .. } => {
                        result.remove(key);
                    }
                }
            }
            Value::Object(result)
        }
    }
}

/// Deterministic content hash of a value.
///
/// Object keys are sorted at every level before hashing, so two values that
/// differ only in key order share a checksum. Returns lowercase hex SHA-256.
pub fn calculate_checksum(value: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(value, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Check a value against an expected checksum.
pub fn verify_checksum(value: &Value, expected: &str) -> bool {
    calculate_checksum(value) == expected
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
                // Serializing a string cannot fail; reuse serde_json's escaping.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(field) = map.get(key.as_str()) {
                    write_canonical(field, out);
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
    use super::*;
    use serde_json::json;

    // ===========================================
    // calculate_delta
    // ===========================================

    #[test]
    fn delta_detects_add_change_remove() {
        let old = json!({"title": "A", "body": "x", "tags": [1]});
        let new = json!({"title": "B", "tags": [1], "author": "me"});

        let Delta::Fields(fields) = calculate_delta(&old, &new) else {
            panic!("expected field delta");
        };

        assert_eq!(fields.len(), 3);
        assert_eq!(
            fields["title"],
            FieldDelta::Change {
                old: json!("A"),
                new: json!("B")
            }
        );
        assert_eq!(fields["body"], FieldDelta::Remove { old: json!("x") });
        assert_eq!(fields["author"], FieldDelta::Add { value: json!("me") });
        assert!(!fields.contains_key("tags"));
    }

    #[test]
    fn delta_of_identical_objects_is_empty() {
        let v = json!({"a": {"nested": [1, 2]}, "b": null});
        assert!(calculate_delta(&v, &v).is_empty());
    }

    #[test]
    fn delta_is_one_level_deep() {
        let old = json!({"meta": {"a": 1, "b": 2}});
        let new = json!({"meta": {"a": 1, "b": 3}});

        let Delta::Fields(fields) = calculate_delta(&old, &new) else {
            panic!("expected field delta");
        };
        assert_eq!(
            fields["meta"],
            FieldDelta::Change {
                old: json!({"a": 1, "b": 2}),
                new: json!({"a": 1, "b": 3})
            }
        );
    }

    #[test]
    fn non_object_values_produce_replace() {
        assert_eq!(
            calculate_delta(&json!(1), &json!("one")),
            Delta::Replace(json!("one"))
        );
        assert_eq!(
            calculate_delta(&json!({"a": 1}), &json!([1])),
            Delta::Replace(json!([1]))
        );
    }

    // ===========================================
    // apply_delta
    // ===========================================

    #[test]
    fn apply_reconstructs_new_value() {
        let cases = [
            (json!({"title": "A"}), json!({"title": "B", "n": 2})),
            (json!({"a": 1, "b": 2}), json!({})),
            (json!({}), json!({"deep": {"x": [1, {"y": null}]}})),
            (json!(null), json!({"a": 1})),
            (json!({"a": 1}), json!("scalar")),
            (json!([1, 2]), json!([2, 3])),
            (json!(true), json!(false)),
        ];

        for (base, target) in cases {
            let delta = calculate_delta(&base, &target);
            assert_eq!(apply_delta(&base, &delta), target, "base={base}");
        }
    }

    #[test]
    fn apply_fields_on_scalar_base_starts_empty() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), FieldDelta::Add { value: json!(1) });
        assert_eq!(apply_delta(&json!(42), &Delta::Fields(fields)), json!({"a": 1}));
    }

    #[test]
    fn apply_remove_of_missing_field_is_no_op() {
        let mut fields = BTreeMap::new();
        fields.insert("gone".to_string(), FieldDelta::Remove { old: json!(1) });
        assert_eq!(
            apply_delta(&json!({"a": 1}), &Delta::Fields(fields)),
            json!({"a": 1})
        );
    }

    // ===========================================
    // calculate_checksum
    // ===========================================

    #[test]
    fn checksum_is_deterministic() {
        let v = json!({"title": "A", "items": [1, 2, 3]});
        assert_eq!(calculate_checksum(&v), calculate_checksum(&v));
        assert_eq!(calculate_checksum(&v).len(), 64);
    }

    #[test]
    fn checksum_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": {"p": true, "q": null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": {"q": null, "p": true}, "x": 1}"#).unwrap();
        assert_eq!(calculate_checksum(&a), calculate_checksum(&b));
    }

    #[test]
    fn checksum_differs_for_different_values() {
        let values = [
            json!(null),
            json!(0),
            json!("0"),
            json!([0]),
            json!({"a": 0}),
            json!({"a": "0"}),
            json!([1, 2]),
            json!([2, 1]),
        ];
        for (i, a) in values.iter().enumerate() {
            for b in &values[i + 1..] {
                assert_ne!(calculate_checksum(a), calculate_checksum(b), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn checksum_escapes_keys() {
        let a = json!({"a\",\"b": 1});
        let b = json!({"a": 1, "b": 1});
        assert_ne!(calculate_checksum(&a), calculate_checksum(&b));
    }

    #[test]
    fn verify_checksum_matches() {
        let v = json!({"k": "v"});
        let sum = calculate_checksum(&v);
        assert!(verify_checksum(&v, &sum));
        assert!(!verify_checksum(&json!({"k": "w"}), &sum));
    }
}

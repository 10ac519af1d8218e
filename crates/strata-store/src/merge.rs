//! Layer merge logic.
//!
//! Tables deep-merge by key; everything else (scalars and arrays) is
//! replaced by the later layer. In strict mode a key that holds a table in
//! one layer and a non-table in the other is a conflict, not an override.

use serde_json::{Map, Value};

use crate::error::StoreError;

/// Merge `incoming` over `dest` in place.
///
/// `path` tracks the dotted position for conflict reporting and must be
/// empty at the top-level call.
pub(crate) fn merge_maps(
    dest: &mut Map<String, Value>,
    incoming: Map<String, Value>,
    strict: bool,
    delimiter: char,
    path: &mut Vec<String>,
) -> Result<(), StoreError> {
    for (key, incoming_value) in incoming {
        path.push(key.clone());
        match dest.get_mut(&key) {
            None => {
                dest.insert(key, incoming_value);
            }
            Some(existing) => match (existing, incoming_value) {
                (Value::Object(existing_map), Value::Object(incoming_map)) => {
                    merge_maps(existing_map, incoming_map, strict, delimiter, path)?;
                }
                (existing, incoming_value) => {
                    let shapes_differ = existing.is_object() != incoming_value.is_object();
                    if strict && shapes_differ {
                        return Err(StoreError::MergeConflict {
                            key: join_path(path, delimiter),
                            existing: value_shape(existing),
                            incoming: value_shape(&incoming_value),
                        });
                    }
                    *existing = incoming_value;
                }
            },
        }
        path.pop();
    }
    Ok(())
}

/// Human-readable shape name used in conflict reports.
pub(crate) fn value_shape(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "table",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

fn join_path(path: &[String], delimiter: char) -> String {
    path.join(&delimiter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {:?}", other),
        }
    }

    fn merge(base: Value, overlay: Value, strict: bool) -> Result<Value, StoreError> {
        let mut dest = as_map(base);
        merge_maps(&mut dest, as_map(overlay), strict, '.', &mut Vec::new())?;
        Ok(Value::Object(dest))
    }

    #[test]
    fn test_scalar_override() {
        let result = merge(json!({"timeout": 100}), json!({"timeout": 200}), true).unwrap();
        assert_eq!(result["timeout"], 200);
    }

    #[test]
    fn test_table_deep_merge() {
        let result = merge(
            json!({"cache": {"mode": "off", "path": "/tmp"}}),
            json!({"cache": {"mode": "on"}}),
            true,
        )
        .unwrap();

        assert_eq!(result["cache"]["mode"], "on");
        assert_eq!(result["cache"]["path"], "/tmp");
    }

    #[test]
    fn test_array_replace() {
        let result = merge(
            json!({"hosts": ["a", "b", "c"]}),
            json!({"hosts": ["x"]}),
            true,
        )
        .unwrap();

        assert_eq!(result["hosts"], json!(["x"]));
    }

    #[test]
    fn test_add_new_key() {
        let result = merge(json!({"a": 1}), json!({"b": 2}), true).unwrap();
        assert_eq!(result["a"], 1);
        assert_eq!(result["b"], 2);
    }

    #[test]
    fn test_strict_table_over_scalar_conflict() {
        let err = merge(
            json!({"a": {"b": "leaf"}}),
            json!({"a": {"b": {"c": 1}}}),
            true,
        )
        .unwrap_err();

        match err {
            StoreError::MergeConflict {
                key,
                existing,
                incoming,
            } => {
                assert_eq!(key, "a.b");
                assert_eq!(existing, "string");
                assert_eq!(incoming, "table");
            }
            other => panic!("expected MergeConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_non_strict_table_over_scalar_overwrites() {
        let result = merge(json!({"a": "leaf"}), json!({"a": {"c": 1}}), false).unwrap();
        assert_eq!(result["a"]["c"], 1);
    }

    #[test]
    fn test_mixed_scalar_types_are_compatible() {
        let result = merge(json!({"port": 3}), json!({"port": "5"}), true).unwrap();
        assert_eq!(result["port"], "5");
    }
}

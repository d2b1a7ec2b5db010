//! Fingerprint extraction and duplicate-key grouping for keyed array diffing.

use std::collections::HashMap;

use serde_json::Value;

use crate::path::KeySpec;
use crate::rules::DuplicateHandling;

/// One collision recorded while building a keyed map.
pub struct DuplicateError {
    pub key_display: String,
    pub indices: Vec<usize>,
}

/// An item slotted into a keyed map, tagged with its original index so
/// collisions can report `"at indices [i, j]"`.
#[derive(Clone)]
struct Slot {
    value: Value,
    index: usize,
}

/// Extract the fingerprint tuple named by `key_spec` from `item`, or `None`
/// if `item` isn't an object or is missing any named field.
pub fn extract_key_value(item: &Value, key_spec: &KeySpec) -> Option<Vec<Value>> {
    let object = item.as_object()?;
    key_spec
        .fields()
        .iter()
        .map(|field| object.get(field).cloned())
        .collect()
}

/// Render a fingerprint the way report messages cite it: bare for a single
/// field, parenthesized tuple for a composite key.
pub fn format_key_value(key: &[Value]) -> String {
    if key.len() == 1 {
        display_one(&key[0])
    } else {
        let parts: Vec<String> = key.iter().map(display_one).collect();
        format!("({})", parts.join(", "))
    }
}

fn display_one(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

fn fingerprint_key(key: &[Value]) -> String {
    serde_json::to_string(key).unwrap_or_default()
}

/// Build a `fingerprint → item` map, following `dup_handling` for
/// collisions. Items with no fingerprint (non-objects, missing key fields)
/// are silently dropped, matching the reference behavior.
pub fn build_key_map(
    items: &[Value],
    key_spec: &KeySpec,
    dup_handling: DuplicateHandling,
) -> (HashMap<String, Value>, Vec<DuplicateError>) {
    let mut slots: HashMap<String, Slot> = HashMap::new();
    let mut duplicates = Vec::new();

    for (index, item) in items.iter().enumerate() {
        let Some(key) = extract_key_value(item, key_spec) else {
            continue;
        };
        let fingerprint = fingerprint_key(&key);

        match slots.get(&fingerprint).cloned() {
            None => {
                slots.insert(
                    fingerprint,
                    Slot {
                        value: item.clone(),
                        index,
                    },
                );
            }
            Some(existing) => match dup_handling {
                DuplicateHandling::Error => {
                    duplicates.push(DuplicateError {
                        key_display: format_key_value(&key),
                        indices: vec![existing.index, index],
                    });
                }
                DuplicateHandling::First => {}
                DuplicateHandling::Last => {
                    slots.insert(
                        fingerprint,
                        Slot {
                            value: item.clone(),
                            index,
                        },
                    );
                }
                DuplicateHandling::Merge => {
                    slots.insert(
                        fingerprint,
                        Slot {
                            value: merge_values(&existing.value, item),
                            index,
                        },
                    );
                }
            },
        }
    }

    let map = slots
        .into_iter()
        .map(|(fingerprint, slot)| (fingerprint, slot.value))
        .collect();
    (map, duplicates)
}

/// Deep right-biased merge: `overlay` wins on scalar conflicts; nested
/// objects merge recursively.
fn merge_values(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut result = base_map.clone();
            for (key, value) in overlay_map {
                let merged = match result.get(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value)
                    }
                    _ => value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn extracts_single_field_key() {
        let item = json!({ "sku": "A", "qty": 1 });
        let key = extract_key_value(&item, &KeySpec::Single("sku".into())).unwrap();
        assert_eq!(key, vec![json!("A")]);
    }

    #[test]
    fn missing_key_field_returns_none() {
        let item = json!({ "qty": 1 });
        assert!(extract_key_value(&item, &KeySpec::Single("sku".into())).is_none());
    }

    #[test]
    fn formats_single_and_composite_keys() {
        assert_eq!(format_key_value(&[json!("A")]), "'A'");
        assert_eq!(format_key_value(&[json!(1)]), "1");
        assert_eq!(format_key_value(&[json!(1), json!(2)]), "(1, 2)");
    }

    #[test]
    fn build_key_map_error_handling_records_collision() {
        let items = vec![json!({"sku": "A", "qty": 1}), json!({"sku": "A", "qty": 2})];
        let (map, dups) =
            build_key_map(&items, &KeySpec::Single("sku".into()), DuplicateHandling::Error);
        assert_eq!(map.len(), 1);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].indices, vec![0, 1]);
    }

    #[test]
    fn build_key_map_last_overwrites() {
        let items = vec![json!({"sku": "A", "qty": 1}), json!({"sku": "A", "qty": 2})];
        let (map, dups) =
            build_key_map(&items, &KeySpec::Single("sku".into()), DuplicateHandling::Last);
        assert!(dups.is_empty());
        let fingerprint = fingerprint_key(&[json!("A")]);
        assert_eq!(map[&fingerprint]["qty"], json!(2));
    }

    #[test]
    fn build_key_map_merge_combines_fields() {
        let items = vec![
            json!({"sku": "A", "a": 1}),
            json!({"sku": "A", "b": 2}),
        ];
        let (map, _) =
            build_key_map(&items, &KeySpec::Single("sku".into()), DuplicateHandling::Merge);
        let fingerprint = fingerprint_key(&[json!("A")]);
        assert_eq!(map[&fingerprint], json!({"sku": "A", "a": 1, "b": 2}));
    }
}

//! Stage C: rewrites both documents before masking and diffing.
//!
//! Runs the seven steps from the component design in fixed order, each over
//! a deep clone, and never touches the caller's original values.

use serde_json::{Map, Value};

use crate::path::{self, Key};
use crate::rules::GlobalRules;
use crate::schema_index::SchemaIndex;

pub struct Normalizer<'a> {
    index: &'a SchemaIndex<'a>,
    global: &'a GlobalRules,
}

impl<'a> Normalizer<'a> {
    pub fn new(index: &'a SchemaIndex<'a>, global: &'a GlobalRules) -> Self {
        Self { index, global }
    }

    /// Produce normalized clones of `old` and `new`. Inputs are never mutated.
    pub fn normalize(&self, old: &Value, new: &Value) -> (Value, Value) {
        let mut old = old.clone();
        let mut new = new.clone();

        for pattern in &self.global.global_ignores {
            old = apply_global_ignore(old, pattern);
            new = apply_global_ignore(new, pattern);
        }

        old = self.apply_aliases(old, "$");

        if self.global.allow_null_as_missing {
            old = strip_nulls(old);
            new = strip_nulls(new);
        }

        if self.global.empty_string_as_null {
            old = empty_strings_to_null(old);
            new = empty_strings_to_null(new);
        }

        old = self.apply_defaults(old, "$");
        new = self.apply_defaults(new, "$");

        old = self.apply_enum_mapping(old, "$");

        old = self.apply_array_sorting(old, "$");
        new = self.apply_array_sorting(new, "$");

        (old, new)
    }

    fn apply_aliases(&self, data: Value, current_path: &str) -> Value {
        match data {
            Value::Object(map) => {
                let mut result = Map::new();
                for (key, value) in map {
                    let target_key = self
                        .alias_target(current_path, &key)
                        .unwrap_or_else(|| key.clone());
                    let child_path = path::build_path(current_path, Key::Name(&target_key));
                    result.insert(target_key, self.apply_aliases(value, &child_path));
                }
                Value::Object(result)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let child_path = path::build_path(current_path, Key::Index(i));
                        self.apply_aliases(item, &child_path)
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// Find the sibling schema property whose `x-migration-alias` equals `key`.
    fn alias_target(&self, parent_path: &str, key: &str) -> Option<String> {
        let (node, _) = self.index.node_and_rules(parent_path).ok().flatten()?;
        let properties = node.get("properties")?.as_object()?;
        for (prop_name, prop_schema) in properties {
            if prop_schema.get("x-migration-alias").and_then(Value::as_str) == Some(key) {
                return Some(prop_name.clone());
            }
        }
        None
    }

    fn apply_defaults(&self, data: Value, current_path: &str) -> Value {
        match data {
            Value::Object(mut map) => {
                if let Ok(Some((node, _))) = self.index.node_and_rules(current_path) {
                    if let Some(properties) = node.get("properties").and_then(Value::as_object) {
                        for (prop_name, prop_schema) in properties {
                            if !map.contains_key(prop_name) {
                                if let Some(default) = prop_schema.get("x-migration-default") {
                                    map.insert(prop_name.clone(), default.clone());
                                }
                            }
                        }
                    }
                }
                let mut result = Map::new();
                for (key, value) in map {
                    let child_path = path::build_path(current_path, Key::Name(&key));
                    result.insert(key, self.apply_defaults(value, &child_path));
                }
                Value::Object(result)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let child_path = path::build_path(current_path, Key::Index(i));
                        self.apply_defaults(item, &child_path)
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    fn apply_enum_mapping(&self, data: Value, current_path: &str) -> Value {
        match data {
            Value::Object(map) => {
                let mut result = Map::new();
                for (key, value) in map {
                    let child_path = path::build_path(current_path, Key::Name(&key));
                    result.insert(key, self.apply_enum_mapping(value, &child_path));
                }
                Value::Object(result)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let child_path = path::build_path(current_path, Key::Index(i));
                        self.apply_enum_mapping(item, &child_path)
                    })
                    .collect(),
            ),
            scalar => {
                if let Ok(Some((_, rules))) = self.index.node_and_rules(current_path) {
                    if let Some(enum_map) = &rules.enum_map {
                        if let Some(key) = scalar_as_map_key(&scalar) {
                            if let Some(mapped) = enum_map.get(&key) {
                                return mapped.clone();
                            }
                        }
                    }
                }
                scalar
            }
        }
    }

    fn apply_array_sorting(&self, data: Value, current_path: &str) -> Value {
        match data {
            Value::Array(items) => {
                let order_by = self
                    .index
                    .node_and_rules(current_path)
                    .ok()
                    .flatten()
                    .map(|(_, rules)| rules.order_by)
                    .unwrap_or_default();

                let items = if order_by.is_empty() {
                    items
                } else {
                    sort_by_fields(items, &order_by)
                };

                Value::Array(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let child_path = path::build_path(current_path, Key::Index(i));
                            self.apply_array_sorting(item, &child_path)
                        })
                        .collect(),
                )
            }
            Value::Object(map) => {
                let mut result = Map::new();
                for (key, value) in map {
                    let child_path = path::build_path(current_path, Key::Name(&key));
                    result.insert(key, self.apply_array_sorting(value, &child_path));
                }
                Value::Object(result)
            }
            other => other,
        }
    }
}

/// `""` if the scalar can't key an enum map (arrays/objects never reach here).
fn scalar_as_map_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
    }
}

fn strip_nulls(data: Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nulls).collect()),
        other => other,
    }
}

fn empty_strings_to_null(data: Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, empty_strings_to_null(v)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(empty_strings_to_null).collect())
        }
        Value::String(s) if s.is_empty() => Value::Null,
        other => other,
    }
}

/// Delete every location matched by one global-ignore pattern. Patterns
/// containing `..` (recursive descent, e.g. `$..updatedAt`) delete every
/// occurrence of that field name anywhere in the tree; other patterns
/// delete the single location they navigate to.
fn apply_global_ignore(data: Value, pattern: &str) -> Value {
    if let Some(field) = recursive_field_name(pattern) {
        delete_field_recursive(data, &field)
    } else {
        delete_exact_path(data, pattern)
    }
}

fn recursive_field_name(pattern: &str) -> Option<String> {
    let (_, after) = pattern.split_once("..")?;
    let field = after.trim_start_matches('.');
    Some(field.to_string())
}

fn delete_field_recursive(data: Value, field: &str) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k != field)
                .map(|(k, v)| (k, delete_field_recursive(v, field)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| delete_field_recursive(item, field))
                .collect(),
        ),
        other => other,
    }
}

fn delete_exact_path(data: Value, pattern: &str) -> Value {
    let segments = path::parse_segments(pattern);
    delete_at_segments(data, &segments)
}

fn delete_at_segments(data: Value, segments: &[path::Segment]) -> Value {
    use path::Segment;
    let Some((head, rest)) = segments.split_first() else {
        return data;
    };
    match (data, head) {
        (Value::Object(mut map), Segment::Key(name)) => {
            if rest.is_empty() {
                map.remove(name);
            } else if let Some(child) = map.remove(name) {
                map.insert(name.clone(), delete_at_segments(child, rest));
            }
            Value::Object(map)
        }
        (Value::Array(mut items), Segment::Index(i)) => {
            if rest.is_empty() {
                if *i < items.len() {
                    items.remove(*i);
                }
            } else if let Some(child) = items.get_mut(*i) {
                *child = delete_at_segments(child.take(), rest);
            }
            Value::Array(items)
        }
        (other, _) => other,
    }
}

/// Stable sort by the fields named in `order_by` (`-` prefix = descending).
/// Missing values sort as the field's zero. Leaves the array untouched if
/// items aren't uniformly objects, or if any two items disagree on a field's
/// type (a string and a number under the same `order_by` key, say) — the
/// whole sort is aborted rather than silently treating that pair as equal.
fn sort_by_fields(items: Vec<Value>, order_by: &[String]) -> Vec<Value> {
    if items.iter().any(|item| !item.is_object()) {
        return items;
    }
    let original = items.clone();
    let incomparable = std::cell::Cell::new(false);
    let mut items = items;
    items.sort_by(|a, b| {
        for field in order_by {
            let (descending, name) = match field.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, field.as_str()),
            };
            let va = a.get(name).cloned().unwrap_or(Value::Null);
            let vb = b.get(name).cloned().unwrap_or(Value::Null);
            let ordering = match compare_sort_values(&va, &vb) {
                Some(ordering) => ordering,
                None => {
                    incomparable.set(true);
                    std::cmp::Ordering::Equal
                }
            };
            let ordering = if descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        std::cmp::Ordering::Equal
    });
    if incomparable.get() {
        return original;
    }
    items
}

/// `None` when `a` and `b` are different JSON types that have no sensible
/// order between them (e.g. a string against a number); `Null` is treated as
/// comparable against numbers and strings since it stands in for a missing
/// field, not a genuine type mismatch.
fn compare_sort_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&b.as_f64().unwrap_or(0.0)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, Value::Number(b)) => 0.0_f64.partial_cmp(&b.as_f64().unwrap_or(0.0)),
        (Value::Number(a), Value::Null) => a.as_f64().unwrap_or(0.0).partial_cmp(&0.0),
        (Value::Null, Value::String(b)) => Some("".cmp(b.as_str())),
        (Value::String(a), Value::Null) => Some(a.as_str().cmp("")),
        _ => None,
    }
}

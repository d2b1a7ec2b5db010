//! Decoding `x-migration-*` schema extensions into typed rule structs.

use serde_json::Value;

use crate::path::KeySpec;

/// Per-field comparison strategy, `x-migration-strategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    #[default]
    Strict,
    Ignore,
    Exists,
    Lenient,
}

/// `x-migration-array-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayMode {
    #[default]
    Strict,
    Unordered,
    Keyed,
}

/// `x-migration-cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Int,
    Float,
    String,
    Boolean,
}

/// `x-migration-duplicate-handling`, applies to keyed arrays only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateHandling {
    #[default]
    Error,
    First,
    Last,
    Merge,
}

/// One field's worth of `x-migration-*` rules, decoded from a schema node.
#[derive(Debug, Clone, Default)]
pub struct FieldRules {
    pub strategy: Strategy,
    pub alias: Option<String>,
    pub precision: Option<f64>,
    pub case_insensitive: bool,
    pub trim_whitespace: bool,
    pub cast: Option<CastType>,
    pub pattern: Option<String>,
    pub datetime_format: Option<String>,
    pub datetime_tolerance: Option<String>,
    pub default: Option<Value>,
    pub has_default: bool,
    pub enum_map: Option<std::collections::BTreeMap<String, Value>>,
    pub array_mode: ArrayMode,
    pub array_key: Option<KeySpec>,
    pub order_by: Vec<String>,
    pub ignore_extra_items: bool,
    pub ignore_missing_items: bool,
    pub array_subset: bool,
    pub duplicate_handling: DuplicateHandling,
    pub inherit_rules: bool,
    pub when_condition: Option<String>,
}

/// Root-level rules extracted once per invocation, `x-migration-global-ignores`
/// and friends.
#[derive(Debug, Clone, Default)]
pub struct GlobalRules {
    pub global_ignores: Vec<String>,
    pub allow_null_as_missing: bool,
    pub empty_string_as_null: bool,
}

/// Read [`GlobalRules`] from the schema root, or from the first entry of
/// `components.schemas` when the root itself carries no root-only keys and
/// a `components.schemas` map is present.
pub fn extract_global_rules(schema: &Value) -> GlobalRules {
    let node = root_rules_node(schema);
    GlobalRules {
        global_ignores: node
            .get("x-migration-global-ignores")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        allow_null_as_missing: node
            .get("x-migration-allow-null-as-missing")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        empty_string_as_null: node
            .get("x-migration-empty-string-as-null")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

fn root_rules_node(schema: &Value) -> &Value {
    let has_root_only_keys = schema.get("x-migration-global-ignores").is_some()
        || schema.get("x-migration-allow-null-as-missing").is_some()
        || schema.get("x-migration-empty-string-as-null").is_some();
    if !has_root_only_keys {
        if let Some(first) = schema
            .get("components")
            .and_then(|c| c.get("schemas"))
            .and_then(Value::as_object)
            .and_then(|map| map.values().next())
        {
            return first;
        }
    }
    schema
}

/// Decode every recognized `x-migration-*` key on `node`. When
/// `parent.inherit_rules` is true, seeds `{strategy, case_insensitive,
/// trim_whitespace, inherit_rules}` from `parent` before node-level
/// overrides are applied. Unknown keys are silently ignored.
pub fn extract_field_rules(node: &Value, parent: Option<&FieldRules>) -> FieldRules {
    let mut rules = FieldRules::default();

    if let Some(parent) = parent {
        if parent.inherit_rules {
            rules.strategy = parent.strategy;
            rules.case_insensitive = parent.case_insensitive;
            rules.trim_whitespace = parent.trim_whitespace;
            rules.inherit_rules = parent.inherit_rules;
        }
    }

    if let Some(s) = node.get("x-migration-strategy").and_then(Value::as_str) {
        rules.strategy = parse_strategy(s).unwrap_or(rules.strategy);
    }
    if let Some(alias) = node.get("x-migration-alias").and_then(Value::as_str) {
        rules.alias = Some(alias.to_string());
    }
    if let Some(precision) = node.get("x-migration-precision").and_then(Value::as_f64) {
        rules.precision = Some(precision);
    }
    if let Some(b) = node
        .get("x-migration-case-insensitive")
        .and_then(Value::as_bool)
    {
        rules.case_insensitive = b;
    }
    if let Some(b) = node
        .get("x-migration-trim-whitespace")
        .and_then(Value::as_bool)
    {
        rules.trim_whitespace = b;
    }
    if let Some(c) = node.get("x-migration-cast").and_then(Value::as_str) {
        rules.cast = parse_cast(c);
    }
    if let Some(p) = node.get("x-migration-pattern").and_then(Value::as_str) {
        rules.pattern = Some(p.to_string());
    }
    if let Some(f) = node
        .get("x-migration-datetime-format")
        .and_then(Value::as_str)
    {
        rules.datetime_format = Some(f.to_string());
    }
    if let Some(t) = node
        .get("x-migration-datetime-tolerance")
        .and_then(Value::as_str)
    {
        rules.datetime_tolerance = Some(t.to_string());
    }
    if let Some(default) = node.get("x-migration-default") {
        rules.default = Some(default.clone());
        rules.has_default = true;
    }
    if let Some(map) = node
        .get("x-migration-enum-map")
        .and_then(Value::as_object)
    {
        rules.enum_map = Some(
            map.iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
    }
    if let Some(m) = node.get("x-migration-array-mode").and_then(Value::as_str) {
        rules.array_mode = parse_array_mode(m).unwrap_or(rules.array_mode);
    }
    if let Some(key) = node.get("x-migration-array-key") {
        rules.array_key = parse_array_key(key);
    }
    if let Some(order_by) = node
        .get("x-migration-order-by")
        .and_then(Value::as_array)
    {
        rules.order_by = order_by
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(b) = node
        .get("x-migration-ignore-extra-items")
        .and_then(Value::as_bool)
    {
        rules.ignore_extra_items = b;
    }
    if let Some(b) = node
        .get("x-migration-ignore-missing-items")
        .and_then(Value::as_bool)
    {
        rules.ignore_missing_items = b;
    }
    if let Some(b) = node.get("x-migration-array-subset").and_then(Value::as_bool) {
        rules.array_subset = b;
    }
    if let Some(d) = node
        .get("x-migration-duplicate-handling")
        .and_then(Value::as_str)
    {
        rules.duplicate_handling = parse_duplicate_handling(d).unwrap_or_default();
    }
    if let Some(b) = node
        .get("x-migration-inherit-rules")
        .and_then(Value::as_bool)
    {
        rules.inherit_rules = b;
    }
    if let Some(w) = node.get("x-migration-when").and_then(Value::as_str) {
        rules.when_condition = Some(w.to_string());
    }

    rules
}

fn parse_strategy(raw: &str) -> Option<Strategy> {
    match raw {
        "strict" => Some(Strategy::Strict),
        "ignore" => Some(Strategy::Ignore),
        "exists" => Some(Strategy::Exists),
        "lenient" => Some(Strategy::Lenient),
        _ => None,
    }
}

fn parse_cast(raw: &str) -> Option<CastType> {
    match raw {
        "int" => Some(CastType::Int),
        "float" => Some(CastType::Float),
        "string" => Some(CastType::String),
        "boolean" => Some(CastType::Boolean),
        _ => None,
    }
}

fn parse_array_mode(raw: &str) -> Option<ArrayMode> {
    match raw {
        "strict" => Some(ArrayMode::Strict),
        "unordered" => Some(ArrayMode::Unordered),
        "keyed" => Some(ArrayMode::Keyed),
        _ => None,
    }
}

fn parse_duplicate_handling(raw: &str) -> Option<DuplicateHandling> {
    match raw {
        "error" => Some(DuplicateHandling::Error),
        "first" => Some(DuplicateHandling::First),
        "last" => Some(DuplicateHandling::Last),
        "merge" => Some(DuplicateHandling::Merge),
        _ => None,
    }
}

fn parse_array_key(value: &Value) -> Option<KeySpec> {
    match value {
        Value::String(s) => Some(KeySpec::Single(s.clone())),
        Value::Array(items) => {
            let fields: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if fields.is_empty() {
                None
            } else {
                Some(KeySpec::Composite(fields))
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_global_ignores_from_root() {
        let schema = json!({
            "x-migration-global-ignores": ["$..updatedAt", "$..metadata"],
            "x-migration-allow-null-as-missing": true
        });
        let global = extract_global_rules(&schema);
        assert_eq!(global.global_ignores, vec!["$..updatedAt", "$..metadata"]);
        assert!(global.allow_null_as_missing);
        assert!(!global.empty_string_as_null);
    }

    #[test]
    fn falls_back_to_first_components_schema() {
        let schema = json!({
            "components": {
                "schemas": {
                    "Widget": { "x-migration-empty-string-as-null": true }
                }
            }
        });
        let global = extract_global_rules(&schema);
        assert!(global.empty_string_as_null);
    }

    #[test]
    fn decodes_basic_field_rules() {
        let node = json!({
            "x-migration-strategy": "lenient",
            "x-migration-precision": 0.01,
            "x-migration-case-insensitive": true
        });
        let rules = extract_field_rules(&node, None);
        assert_eq!(rules.strategy, Strategy::Lenient);
        assert_eq!(rules.precision, Some(0.01));
        assert!(rules.case_insensitive);
    }

    #[test]
    fn inherit_rules_seeds_from_parent() {
        let parent = FieldRules {
            strategy: Strategy::Lenient,
            case_insensitive: true,
            trim_whitespace: true,
            inherit_rules: true,
            ..Default::default()
        };
        let node = json!({});
        let rules = extract_field_rules(&node, Some(&parent));
        assert_eq!(rules.strategy, Strategy::Lenient);
        assert!(rules.case_insensitive);
        assert!(rules.trim_whitespace);
    }

    #[test]
    fn node_overrides_inherited_values() {
        let parent = FieldRules {
            strategy: Strategy::Lenient,
            inherit_rules: true,
            ..Default::default()
        };
        let node = json!({ "x-migration-strategy": "strict" });
        let rules = extract_field_rules(&node, Some(&parent));
        assert_eq!(rules.strategy, Strategy::Strict);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let node = json!({ "x-migration-bogus": "whatever" });
        let rules = extract_field_rules(&node, None);
        assert_eq!(rules.strategy, Strategy::Strict);
    }

    #[test]
    fn array_key_single_vs_composite() {
        let single = extract_field_rules(&json!({ "x-migration-array-key": "sku" }), None);
        assert_eq!(single.array_key, Some(KeySpec::Single("sku".into())));

        let composite =
            extract_field_rules(&json!({ "x-migration-array-key": ["a", "b"] }), None);
        assert_eq!(
            composite.array_key,
            Some(KeySpec::Composite(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn order_by_preserves_descending_prefix() {
        let node = json!({ "x-migration-order-by": ["name", "-priority"] });
        let rules = extract_field_rules(&node, None);
        assert_eq!(rules.order_by, vec!["name", "-priority"]);
    }

    #[test]
    fn default_value_sets_has_default() {
        let node = json!({ "x-migration-default": 0 });
        let rules = extract_field_rules(&node, None);
        assert!(rules.has_default);
        assert_eq!(rules.default, Some(json!(0)));
    }
}

//! A memoizing `path → (schema node, FieldRules)` index over a resolved schema.

use std::cell::RefCell;
use std::collections::HashMap;

use serde_json::Value;

use crate::error::EngineError;
use crate::path::Segment;
use crate::resolver::SchemaResolver;
use crate::rules::{extract_field_rules, FieldRules};

/// Built once per invocation; descends the schema tree on demand and caches
/// the result of each descent by its path string.
pub struct SchemaIndex<'a> {
    resolver: SchemaResolver<'a>,
    root: &'a Value,
    cache: RefCell<HashMap<String, Option<(Value, FieldRules)>>>,
}

impl<'a> SchemaIndex<'a> {
    pub fn new(root: &'a Value, max_depth: usize) -> Self {
        Self {
            resolver: SchemaResolver::new(root, max_depth),
            root,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve the schema node and decoded rules for `path`, descending from
    /// the root and inheriting rules along the way. Returns `None` if the
    /// path cannot be navigated over the schema (e.g. no child schema
    /// exists for that step) — the default, rule-free `FieldRules` is the
    /// caller's fallback in that case.
    pub fn node_and_rules(&self, path: &str) -> Result<Option<(Value, FieldRules)>, EngineError> {
        if let Some(hit) = self.cache.borrow().get(path) {
            return Ok(hit.clone());
        }

        let segments = crate::path::parse_segments(path);
        let result = self.descend(&segments, path)?;
        self.cache
            .borrow_mut()
            .insert(path.to_string(), result.clone());
        Ok(result)
    }

    /// Convenience wrapper returning just the rules, defaulting when no
    /// schema node covers this path.
    pub fn rules_for_path(&self, path: &str) -> Result<FieldRules, EngineError> {
        Ok(self
            .node_and_rules(path)?
            .map(|(_, rules)| rules)
            .unwrap_or_default())
    }

    fn descend(
        &self,
        segments: &[Segment],
        full_path: &str,
    ) -> Result<Option<(Value, FieldRules)>, EngineError> {
        let resolved_root = self.resolver.resolve(self.root, "$")?.clone();
        let mut node = resolved_root;
        let mut rules = extract_field_rules(&node, None);

        for segment in segments {
            let next = match segment {
                Segment::Key(name) => step_into_property(&node, name),
                Segment::Index(_) | Segment::Filter(_) => step_into_items(&node),
            };
            let Some(child) = next else {
                return Ok(None);
            };
            let resolved_child = self.resolver.resolve(&child, full_path)?.clone();
            rules = extract_field_rules(&resolved_child, Some(&rules));
            node = resolved_child;
        }

        Ok(Some((node, rules)))
    }
}

fn step_into_property(node: &Value, name: &str) -> Option<Value> {
    let properties = node.get("properties")?;
    if let Some(child) = properties.get(name) {
        return Some(child.clone());
    }
    node.get("additionalProperties").cloned()
}

fn step_into_items(node: &Value) -> Option<Value> {
    node.get("items").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_property_rules() {
        let schema = json!({
            "type": "object",
            "properties": {
                "total": { "type": "number", "x-migration-precision": 0.01 }
            }
        });
        let index = SchemaIndex::new(&schema, 10);
        let rules = index.rules_for_path("$.total").unwrap();
        assert_eq!(rules.precision, Some(0.01));
    }

    #[test]
    fn falls_back_to_additional_properties() {
        let schema = json!({
            "type": "object",
            "additionalProperties": { "x-migration-strategy": "ignore" }
        });
        let index = SchemaIndex::new(&schema, 10);
        let rules = index.rules_for_path("$.anything").unwrap();
        assert_eq!(rules.strategy, crate::rules::Strategy::Ignore);
    }

    #[test]
    fn descends_into_array_items() {
        let schema = json!({
            "type": "array",
            "items": { "x-migration-precision": 0.5 }
        });
        let index = SchemaIndex::new(&schema, 10);
        let rules = index.rules_for_path("$[0]").unwrap();
        assert_eq!(rules.precision, Some(0.5));
    }

    #[test]
    fn missing_schema_node_returns_none() {
        let schema = json!({ "type": "object", "properties": {} });
        let index = SchemaIndex::new(&schema, 10);
        assert!(index.node_and_rules("$.nope").unwrap().is_none());
    }

    #[test]
    fn caches_repeated_lookups() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "x-migration-precision": 1.0 } }
        });
        let index = SchemaIndex::new(&schema, 10);
        let first = index.rules_for_path("$.a").unwrap();
        let second = index.rules_for_path("$.a").unwrap();
        assert_eq!(first.precision, second.precision);
    }

    #[test]
    fn resolves_ref_along_descent() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "$ref": "#/components/schemas/A" } },
            "components": {
                "schemas": { "A": { "x-migration-precision": 0.25 } }
            }
        });
        let index = SchemaIndex::new(&schema, 10);
        let rules = index.rules_for_path("$.a").unwrap();
        assert_eq!(rules.precision, Some(0.25));
    }

    #[test]
    fn inherits_rules_through_nesting() {
        let schema = json!({
            "type": "object",
            "x-migration-inherit-rules": true,
            "x-migration-case-insensitive": true,
            "properties": {
                "child": {
                    "type": "object",
                    "x-migration-inherit-rules": true,
                    "properties": { "leaf": {} }
                }
            }
        });
        let index = SchemaIndex::new(&schema, 10);
        let rules = index.rules_for_path("$.child.leaf").unwrap();
        assert!(rules.case_insensitive);
    }
}

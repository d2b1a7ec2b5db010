//! Internal `$ref` resolution over a single schema document.
//!
//! Only pointers rooted at `#/` are supported: the engine never fetches
//! anything over the network. External refs and ref cycles are reported as
//! [`EngineError::SchemaParse`](crate::error::EngineError) rather than
//! followed.

use serde_json::Value;

use crate::error::EngineError;

/// Resolves `$ref` nodes against a fixed root schema document.
pub struct SchemaResolver<'a> {
    root: &'a Value,
    max_depth: usize,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(root: &'a Value, max_depth: usize) -> Self {
        Self { root, max_depth }
    }

    /// Resolve `node` if it is a `$ref` wrapper, following chained refs until
    /// a concrete (non-`$ref`) node is reached. Returns the node unchanged if
    /// it carries no `$ref`. Beyond `max_depth` the chain is left unresolved
    /// (the current, still-`$ref`-bearing node is returned as-is) rather than
    /// raising; `EngineError::MaxDepth` is reserved for the Differ's own
    /// recursion bound during diffing.
    pub fn resolve<'b>(&'b self, node: &'b Value, path: &str) -> Result<&'b Value, EngineError>
    where
        'a: 'b,
    {
        let mut current = node;
        let mut stack: Vec<String> = Vec::new();

        while let Some(reference) = current.get("$ref").and_then(Value::as_str) {
            if stack.len() >= self.max_depth {
                return Ok(current);
            }
            if !is_internal_pointer(reference) {
                return Err(EngineError::external_ref(path, reference));
            }
            if stack.iter().any(|seen| seen == reference) {
                return Err(EngineError::circular_ref(path, reference));
            }
            stack.push(reference.to_string());
            current = self.resolve_pointer(reference, path)?;
        }

        Ok(current)
    }

    /// Navigate a `#/a/b/c` pointer from the document root.
    fn resolve_pointer(&self, reference: &str, path: &str) -> Result<&'a Value, EngineError> {
        let pointer = reference.strip_prefix('#').unwrap_or(reference);
        if pointer.is_empty() {
            return Ok(self.root);
        }
        let mut node = self.root;
        for raw_segment in pointer.split('/').filter(|s| !s.is_empty()) {
            let segment = unescape_pointer_segment(raw_segment);
            node = match node {
                Value::Object(map) => map
                    .get(&segment)
                    .ok_or_else(|| EngineError::unresolvable_ref(path, reference))?,
                Value::Array(arr) => {
                    let index: usize = segment
                        .parse()
                        .map_err(|_| EngineError::unresolvable_ref(path, reference))?;
                    arr.get(index)
                        .ok_or_else(|| EngineError::unresolvable_ref(path, reference))?
                }
                _ => return Err(EngineError::unresolvable_ref(path, reference)),
            };
        }
        Ok(node)
    }
}

/// A reference is internal only when it is rooted at `#/` (or is the bare
/// `#` whole-document pointer). Anything else — `http://`, `https://`, a
/// relative file reference, a bare `other.json#/foo` — is rejected.
fn is_internal_pointer(reference: &str) -> bool {
    reference == "#" || reference.starts_with("#/")
}

fn unescape_pointer_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_simple_pointer() {
        let root = json!({
            "components": { "schemas": { "Widget": { "type": "string" } } },
            "node": { "$ref": "#/components/schemas/Widget" }
        });
        let resolver = SchemaResolver::new(&root, 10);
        let node = root.get("node").unwrap();
        let resolved = resolver.resolve(node, "$.node").unwrap();
        assert_eq!(resolved, &json!({ "type": "string" }));
    }

    #[test]
    fn follows_chained_refs() {
        let root = json!({
            "a": { "$ref": "#/b" },
            "b": { "$ref": "#/c" },
            "c": { "type": "integer" }
        });
        let resolver = SchemaResolver::new(&root, 10);
        let resolved = resolver.resolve(root.get("a").unwrap(), "$.a").unwrap();
        assert_eq!(resolved, &json!({ "type": "integer" }));
    }

    #[test]
    fn passes_through_non_ref_nodes() {
        let root = json!({ "type": "boolean" });
        let resolver = SchemaResolver::new(&root, 10);
        let resolved = resolver.resolve(&root, "$").unwrap();
        assert_eq!(resolved, &root);
    }

    #[test]
    fn rejects_external_ref() {
        let root = json!({ "node": { "$ref": "https://example.com/schema.json" } });
        let resolver = SchemaResolver::new(&root, 10);
        let err = resolver
            .resolve(root.get("node").unwrap(), "$.node")
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::SchemaParseError);
    }

    #[test]
    fn rejects_relative_file_ref() {
        let root = json!({ "node": { "$ref": "other.json#/Foo" } });
        let resolver = SchemaResolver::new(&root, 10);
        assert!(resolver.resolve(root.get("node").unwrap(), "$.node").is_err());
    }

    #[test]
    fn detects_circular_ref() {
        let root = json!({
            "a": { "$ref": "#/b" },
            "b": { "$ref": "#/a" }
        });
        let resolver = SchemaResolver::new(&root, 10);
        let err = resolver
            .resolve(root.get("a").unwrap(), "$.a")
            .unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn unresolvable_pointer_is_an_error() {
        let root = json!({ "node": { "$ref": "#/does/not/exist" } });
        let resolver = SchemaResolver::new(&root, 10);
        assert!(resolver.resolve(root.get("node").unwrap(), "$.node").is_err());
    }

    #[test]
    fn unescapes_pointer_segments() {
        let root = json!({
            "components": { "schemas": { "a/b": { "c~d": { "type": "null" } } } }
        });
        let resolver = SchemaResolver::new(&root, 10);
        let node = json!({ "$ref": "#/components/schemas/a~1b/c~0d" });
        let resolved = resolver.resolve(&node, "$").unwrap();
        assert_eq!(resolved, &json!({ "type": "null" }));
    }

    #[test]
    fn leaves_chain_unresolved_beyond_max_depth() {
        let root = json!({
            "r0": { "$ref": "#/r1" },
            "r1": { "$ref": "#/r2" },
            "r2": { "type": "string" }
        });
        let resolver = SchemaResolver::new(&root, 1);
        let resolved = resolver.resolve(root.get("r0").unwrap(), "$").unwrap();
        assert_eq!(resolved, &json!({ "$ref": "#/r2" }));
    }
}

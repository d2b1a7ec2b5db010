//! Stage D: strips `x-migration-strategy: ignore` subtrees before diffing.

use serde_json::{Map, Value};

use crate::path::{self, Key};
use crate::rules::Strategy;
use crate::schema_index::SchemaIndex;

pub struct Masker<'a> {
    index: &'a SchemaIndex<'a>,
}

impl<'a> Masker<'a> {
    pub fn new(index: &'a SchemaIndex<'a>) -> Self {
        Self { index }
    }

    /// Mask both normalized documents, returning the masked pair and the
    /// total number of fields omitted for carrying `strategy: ignore`.
    pub fn mask(&self, old: &Value, new: &Value) -> (Value, Value, usize) {
        let mut ignored = 0usize;
        let masked_old = self.mask_one(old, "$", &mut ignored);
        let masked_new = self.mask_one(new, "$", &mut ignored);
        (masked_old, masked_new, ignored)
    }

    fn mask_one(&self, data: &Value, current_path: &str, ignored: &mut usize) -> Value {
        match data {
            Value::Object(map) => {
                let mut result = Map::new();
                for (key, value) in map {
                    let child_path = path::build_path(current_path, Key::Name(key));
                    if self.is_ignored(&child_path) {
                        *ignored += 1;
                        continue;
                    }
                    result.insert(key.clone(), self.mask_one(value, &child_path, ignored));
                }
                Value::Object(result)
            }
            Value::Array(items) => {
                let mut result = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child_path = path::build_path(current_path, Key::Index(i));
                    if self.is_ignored(&child_path) {
                        *ignored += 1;
                        result.push(Value::Null);
                        continue;
                    }
                    result.push(self.mask_one(item, &child_path, ignored));
                }
                Value::Array(result)
            }
            other => other.clone(),
        }
    }

    fn is_ignored(&self, path: &str) -> bool {
        self.index
            .rules_for_path(path)
            .map(|rules| rules.strategy == Strategy::Ignore)
            .unwrap_or(false)
    }
}

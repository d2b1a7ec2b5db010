//! Stage E: typed deep comparison, the heart of the engine.

mod array;

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use serde_json::Value;

use crate::comparators::Comparators;
use crate::condition;
use crate::error::EngineError;
use crate::path::{self, Key};
use crate::report::{DiffEntry, DiffType, Severity, TraceEntry, WarningEntry};
use crate::rules::{ArrayMode, CastType, FieldRules, Strategy};
use crate::schema_index::SchemaIndex;

/// Accumulated output of a `Differ` run.
pub struct DiffOutcome {
    pub is_match: bool,
    pub diffs: Vec<DiffEntry>,
    pub warnings: Vec<WarningEntry>,
    pub traces: Vec<TraceEntry>,
    pub fields_checked: usize,
}

/// Walks a masked document pair, consulting the schema index at every path
/// and accumulating diffs/warnings/traces as it goes.
pub struct Differ<'a> {
    index: &'a SchemaIndex<'a>,
    comparators: Comparators,
    root_pair: Value,
    fail_fast: bool,
    trace_enabled: bool,
    max_depth: usize,
    diffs: RefCell<Vec<DiffEntry>>,
    warnings: RefCell<Vec<WarningEntry>>,
    traces: RefCell<Vec<TraceEntry>>,
    fields_checked: Cell<usize>,
    aborted: Cell<bool>,
}

impl<'a> Differ<'a> {
    pub fn new(
        index: &'a SchemaIndex<'a>,
        old_root: &Value,
        new_root: &Value,
        fail_fast: bool,
        trace_enabled: bool,
        max_depth: usize,
    ) -> Self {
        Self {
            index,
            comparators: Comparators::new(),
            root_pair: serde_json::json!({ "old": old_root, "new": new_root }),
            fail_fast,
            trace_enabled,
            max_depth,
            diffs: RefCell::new(Vec::new()),
            warnings: RefCell::new(Vec::new()),
            traces: RefCell::new(Vec::new()),
            fields_checked: Cell::new(0),
            aborted: Cell::new(false),
        }
    }

    /// Run the comparison from the document root and consume `self` into its
    /// accumulated findings.
    pub fn run(self, old: &Value, new: &Value) -> Result<DiffOutcome, EngineError> {
        let is_match = self.diff(old, new, "$", 0)?;
        Ok(DiffOutcome {
            is_match,
            diffs: self.diffs.into_inner(),
            warnings: self.warnings.into_inner(),
            traces: self.traces.into_inner(),
            fields_checked: self.fields_checked.get(),
        })
    }

    fn diff(&self, old: &Value, new: &Value, path: &str, depth: usize) -> Result<bool, EngineError> {
        if self.aborted.get() {
            return Ok(false);
        }
        if depth > self.max_depth {
            return Err(EngineError::MaxDepth {
                path: path.to_string(),
                max_depth: self.max_depth,
            });
        }

        let rules = self.index.rules_for_path(path)?;

        if let Some(condition) = &rules.when_condition {
            if !condition::evaluate(&self.root_pair, condition) {
                self.add_trace(
                    path,
                    "x-migration-when",
                    "skipped",
                    Some(serde_json::json!({ "condition": condition })),
                );
                return Ok(true);
            }
        }

        if rules.strategy == Strategy::Ignore {
            self.add_trace(path, "x-migration-strategy", "ignored", None);
            return Ok(true);
        }

        if rules.strategy == Strategy::Exists {
            self.add_trace(path, "x-migration-strategy", "exists-check", None);
            let old_exists = !old.is_null();
            let new_exists = !new.is_null();
            if old_exists != new_exists {
                self.add_diff(
                    path,
                    DiffType::ValueMismatch,
                    old.clone(),
                    new.clone(),
                    format!(
                        "existence mismatch: old {}, new {}",
                        if old_exists { "exists" } else { "missing" },
                        if new_exists { "exists" } else { "missing" },
                    ),
                    Some("x-migration-strategy: exists".to_string()),
                );
                return Ok(false);
            }
            self.fields_checked.set(self.fields_checked.get() + 1);
            return Ok(true);
        }

        if old.is_null() && new.is_null() {
            self.fields_checked.set(self.fields_checked.get() + 1);
            return Ok(true);
        }
        if old.is_null() {
            self.add_diff(
                path,
                DiffType::MissingInNew,
                old.clone(),
                new.clone(),
                format!("field missing in old, present in new: {new}"),
                None,
            );
            return Ok(false);
        }
        if new.is_null() {
            self.add_diff(
                path,
                DiffType::MissingInNew,
                old.clone(),
                new.clone(),
                format!("field present in old ({old}), missing in new"),
                None,
            );
            return Ok(false);
        }

        let (old, new) = if let Some(cast) = rules.cast {
            self.add_trace(
                path,
                "x-migration-cast",
                "applied",
                Some(serde_json::json!({ "cast_type": cast_name(cast) })),
            );
            (apply_cast(old, cast), apply_cast(new, cast))
        } else {
            (old.clone(), new.clone())
        };

        if !types_compatible(&old, &new) {
            self.add_diff(
                path,
                DiffType::TypeMismatch,
                old.clone(),
                new.clone(),
                format!(
                    "type mismatch: {} vs {}",
                    type_name(&old),
                    type_name(&new)
                ),
                None,
            );
            return Ok(false);
        }

        match (&old, &new) {
            (Value::Object(old_map), Value::Object(new_map)) => {
                self.diff_object(old_map, new_map, path, &rules, depth)
            }
            (Value::Array(old_items), Value::Array(new_items)) => {
                self.diff_array(old_items, new_items, path, &rules, depth)
            }
            _ => self.diff_scalar(&old, &new, path, &rules),
        }
    }

    fn diff_object(
        &self,
        old: &serde_json::Map<String, Value>,
        new: &serde_json::Map<String, Value>,
        path: &str,
        rules: &FieldRules,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let mut all_match = true;
        let all_keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();

        for key in all_keys {
            if self.aborted.get() {
                return Ok(false);
            }
            let child_path = path::build_path(path, Key::Name(key));

            match (old.get(key), new.get(key)) {
                (None, Some(new_value)) => {
                    let child_rules = self.index.rules_for_path(&child_path)?;
                    if child_rules.strategy != Strategy::Ignore {
                        self.add_diff(
                            &child_path,
                            DiffType::ExtraInNew,
                            Value::Null,
                            new_value.clone(),
                            format!("extra field in new: {key}"),
                            None,
                        );
                        all_match = false;
                    }
                }
                (Some(old_value), None) => {
                    let child_rules = self.index.rules_for_path(&child_path)?;
                    if child_rules.strategy != Strategy::Ignore {
                        if child_rules.has_default {
                            let default = child_rules.default.clone().unwrap_or(Value::Null);
                            if !self.diff(old_value, &default, &child_path, depth + 1)? {
                                all_match = false;
                            }
                        } else {
                            self.add_diff(
                                &child_path,
                                DiffType::MissingInNew,
                                old_value.clone(),
                                Value::Null,
                                format!("field missing in new: {key}"),
                                None,
                            );
                            all_match = false;
                        }
                    }
                }
                (Some(old_value), Some(new_value)) => {
                    if !self.diff(old_value, new_value, &child_path, depth + 1)? {
                        all_match = false;
                    }
                }
                (None, None) => unreachable!("key came from one of the two maps"),
            }
        }

        let _ = rules;
        Ok(all_match)
    }

    fn diff_array(
        &self,
        old: &[Value],
        new: &[Value],
        path: &str,
        rules: &FieldRules,
        depth: usize,
    ) -> Result<bool, EngineError> {
        match rules.array_mode {
            ArrayMode::Keyed => self.diff_keyed_array(old, new, path, rules, depth),
            ArrayMode::Unordered => self.diff_unordered_array(old, new, path, rules, depth),
            ArrayMode::Strict => self.diff_strict_array(old, new, path, rules, depth),
        }
    }

    fn diff_strict_array(
        &self,
        old: &[Value],
        new: &[Value],
        path: &str,
        rules: &FieldRules,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let mut all_match = true;

        if old.len() != new.len() {
            if new.len() > old.len() {
                if !rules.ignore_extra_items {
                    self.add_diff(
                        path,
                        DiffType::ArrayLengthMismatch,
                        serde_json::json!(old.len()),
                        serde_json::json!(new.len()),
                        format!("array length mismatch: {} vs {}", old.len(), new.len()),
                        None,
                    );
                    all_match = false;
                }
            } else if !rules.ignore_missing_items {
                self.add_diff(
                    path,
                    DiffType::ArrayLengthMismatch,
                    serde_json::json!(old.len()),
                    serde_json::json!(new.len()),
                    format!("array length mismatch: {} vs {}", old.len(), new.len()),
                    None,
                );
                all_match = false;
            }
        }

        let common_len = old.len().min(new.len());
        for i in 0..common_len {
            if self.aborted.get() {
                return Ok(false);
            }
            let child_path = path::build_path(path, Key::Index(i));
            if !self.diff(&old[i], &new[i], &child_path, depth + 1)? {
                all_match = false;
            }
        }

        if new.len() > old.len() {
            if rules.ignore_extra_items {
                self.add_warning(
                    path,
                    DiffType::ArrayItemExtra,
                    format!(
                        "new array contains {} extra items (allowed by x-migration-ignore-extra-items)",
                        new.len() - old.len()
                    ),
                );
            } else {
                for i in old.len()..new.len() {
                    let child_path = path::build_path(path, Key::Index(i));
                    self.add_diff(
                        &child_path,
                        DiffType::ArrayItemExtra,
                        Value::Null,
                        new[i].clone(),
                        format!("extra item in new array at index {i}"),
                        None,
                    );
                }
                all_match = false;
            }
        }

        if old.len() > new.len() && !rules.ignore_missing_items {
            for i in new.len()..old.len() {
                let child_path = path::build_path(path, Key::Index(i));
                self.add_diff(
                    &child_path,
                    DiffType::ArrayItemMissing,
                    old[i].clone(),
                    Value::Null,
                    format!("missing item in new array at index {i}"),
                    None,
                );
            }
            all_match = false;
        }

        Ok(all_match)
    }

    fn diff_unordered_array(
        &self,
        old: &[Value],
        new: &[Value],
        path: &str,
        rules: &FieldRules,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let mut all_match = true;
        let mut old_matched = vec![false; old.len()];
        let mut new_matched = vec![false; new.len()];

        for (i, old_item) in old.iter().enumerate() {
            for (j, new_item) in new.iter().enumerate() {
                if new_matched[j] {
                    continue;
                }
                let child_path = path::build_path(path, Key::Index(i));
                if self.items_equal(old_item, new_item, &child_path, depth + 1)? {
                    old_matched[i] = true;
                    new_matched[j] = true;
                    self.fields_checked.set(self.fields_checked.get() + 1);
                    break;
                }
            }
        }

        for (i, matched) in old_matched.iter().enumerate() {
            if !matched && !rules.ignore_missing_items && !rules.array_subset {
                let child_path = path::build_path(path, Key::Index(i));
                self.add_diff(
                    &child_path,
                    DiffType::ArrayItemMissing,
                    old[i].clone(),
                    Value::Null,
                    "item from old array not found in new".to_string(),
                    None,
                );
                all_match = false;
            }
        }

        for (j, matched) in new_matched.iter().enumerate() {
            if !matched {
                let child_path = path::build_path(path, Key::Index(j));
                if rules.ignore_extra_items {
                    self.add_warning(
                        &child_path,
                        DiffType::ArrayItemExtra,
                        "extra item in new array (allowed by x-migration-ignore-extra-items)"
                            .to_string(),
                    );
                } else {
                    self.add_diff(
                        &child_path,
                        DiffType::ArrayItemExtra,
                        Value::Null,
                        new[j].clone(),
                        "extra item in new array".to_string(),
                        None,
                    );
                    all_match = false;
                }
            }
        }

        Ok(all_match)
    }

    fn diff_keyed_array(
        &self,
        old: &[Value],
        new: &[Value],
        path: &str,
        rules: &FieldRules,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let mut all_match = true;
        let key_spec = match &rules.array_key {
            Some(spec) => spec.clone(),
            None => crate::path::KeySpec::Single("id".to_string()),
        };

        let (old_map, old_dups) = array::build_key_map(old, &key_spec, rules.duplicate_handling);
        let (new_map, new_dups) = array::build_key_map(new, &key_spec, rules.duplicate_handling);

        for dup in old_dups.into_iter().chain(new_dups) {
            self.add_diff(
                path,
                DiffType::DuplicateKey,
                Value::Null,
                Value::Null,
                format!(
                    "duplicate key {} at indices {:?}",
                    dup.key_display, dup.indices
                ),
                Some(format!("x-migration-array-key: {}", key_spec_display(&key_spec))),
            );
            all_match = false;
        }

        let mut all_fingerprints: BTreeSet<String> =
            old_map.keys().cloned().collect();
        all_fingerprints.extend(new_map.keys().cloned());

        for fingerprint in all_fingerprints {
            if self.aborted.get() {
                return Ok(false);
            }
            let key_display = display_for_fingerprint(&old_map, &new_map, &fingerprint);
            let item_path = path::keyed_item_path(path, &key_spec, &key_display);

            match (old_map.get(&fingerprint), new_map.get(&fingerprint)) {
                (None, Some(new_item)) => {
                    if rules.ignore_extra_items {
                        self.add_warning(
                            &item_path,
                            DiffType::ArrayItemExtra,
                            format!("extra item with key {key_display} in new (allowed)"),
                        );
                    } else {
                        self.add_diff(
                            &item_path,
                            DiffType::ArrayItemExtra,
                            Value::Null,
                            new_item.clone(),
                            format!("extra item with key {key_display} in new array"),
                            None,
                        );
                        all_match = false;
                    }
                }
                (Some(old_item), None) => {
                    if rules.ignore_missing_items {
                        self.add_warning(
                            &item_path,
                            DiffType::ArrayItemMissing,
                            format!("missing item with key {key_display} in new (allowed)"),
                        );
                    } else {
                        self.add_diff(
                            &item_path,
                            DiffType::ArrayItemMissing,
                            old_item.clone(),
                            Value::Null,
                            format!("missing item with key {key_display} in new array"),
                            None,
                        );
                        all_match = false;
                    }
                }
                (Some(old_item), Some(new_item)) => {
                    if !self.diff(old_item, new_item, &item_path, depth + 1)? {
                        all_match = false;
                    }
                }
                (None, None) => unreachable!("fingerprint came from one of the two maps"),
            }
        }

        Ok(all_match)
    }

    fn diff_scalar(
        &self,
        old: &Value,
        new: &Value,
        path: &str,
        rules: &FieldRules,
    ) -> Result<bool, EngineError> {
        self.fields_checked.set(self.fields_checked.get() + 1);

        let mut rules = rules.clone();
        if rules.strategy == Strategy::Lenient {
            rules.trim_whitespace = true;
            rules.case_insensitive = true;
        }

        let (is_match, message) = self.compare_scalars(old, new, &rules);

        if is_match {
            if rules.precision.is_some() {
                self.add_trace(
                    path,
                    "x-migration-precision",
                    "matched",
                    Some(serde_json::json!({ "precision": rules.precision })),
                );
            }
            return Ok(true);
        }

        let (diff_type, rule_applied) = if rules.precision.is_some() {
            (
                DiffType::PrecisionExceeded,
                Some(format!("x-migration-precision: {}", rules.precision.unwrap())),
            )
        } else if let Some(pattern) = &rules.pattern {
            (
                DiffType::PatternMismatch,
                Some(format!("x-migration-pattern: {pattern}")),
            )
        } else if let Some(tolerance) = &rules.datetime_tolerance {
            if crate::comparators::is_valid_tolerance(tolerance) {
                (
                    DiffType::DatetimeExceeded,
                    Some(format!("x-migration-datetime-tolerance: {tolerance}")),
                )
            } else {
                (DiffType::ValueMismatch, None)
            }
        } else {
            (DiffType::ValueMismatch, None)
        };

        self.add_diff(path, diff_type, old.clone(), new.clone(), message, rule_applied);
        Ok(false)
    }

    /// Dispatches to the relevant comparator, mirroring the datetime → numeric
    /// → string → boolean → fallback order, with default substitution for
    /// one-sided nulls already resolved by the caller.
    fn compare_scalars(&self, old: &Value, new: &Value, rules: &FieldRules) -> (bool, String) {
        let has_datetime_rule = rules.datetime_format.is_some() || rules.datetime_tolerance.is_some();

        if has_datetime_rule {
            if let (Some(old_str), Some(new_str)) = (as_datetime_str(old), as_datetime_str(new)) {
                return self.comparators.compare_datetime(
                    &old_str,
                    &new_str,
                    rules.datetime_format.as_deref(),
                    rules.datetime_tolerance.as_deref(),
                );
            }
        }

        if rules.precision.is_some() {
            if let (Some(a), Some(b)) = (old.as_f64(), new.as_f64()) {
                return self.comparators.compare_numbers(a, b, rules.precision);
            }
        }

        if crate::comparators::is_numeric(old) && crate::comparators::is_numeric(new) {
            if let (Some(a), Some(b)) = (old.as_f64(), new.as_f64()) {
                return self.comparators.compare_numbers(a, b, None);
            }
        }

        if old.is_string() || new.is_string() {
            return self.comparators.compare_strings(
                &as_display_str(old),
                &as_display_str(new),
                rules.trim_whitespace,
                rules.case_insensitive,
                rules.pattern.as_deref(),
            );
        }

        if let (Value::Bool(a), Value::Bool(b)) = (old, new) {
            return if a == b {
                (true, String::new())
            } else {
                (false, format!("booleans differ: {a} != {b}"))
            };
        }

        if old == new {
            (true, String::new())
        } else {
            (false, format!("values differ: {old} != {new}"))
        }
    }

    /// Evaluates equality for unordered-array pairwise matching via a
    /// disposable, fail-fast sub-differ so the outer accumulators stay clean.
    fn items_equal(
        &self,
        old: &Value,
        new: &Value,
        path: &str,
        depth: usize,
    ) -> Result<bool, EngineError> {
        let sub = Differ {
            index: self.index,
            comparators: Comparators::new(),
            root_pair: self.root_pair.clone(),
            fail_fast: true,
            trace_enabled: false,
            max_depth: self.max_depth,
            diffs: RefCell::new(Vec::new()),
            warnings: RefCell::new(Vec::new()),
            traces: RefCell::new(Vec::new()),
            fields_checked: Cell::new(0),
            aborted: Cell::new(false),
        };
        sub.diff(old, new, path, depth)
    }

    fn add_diff(
        &self,
        path: &str,
        diff_type: DiffType,
        old_value: Value,
        new_value: Value,
        message: String,
        rule_applied: Option<String>,
    ) {
        self.diffs.borrow_mut().push(DiffEntry {
            path: path.to_string(),
            diff_type,
            severity: Severity::Error,
            old_value,
            new_value,
            message,
            rule_applied,
        });
        if self.fail_fast {
            self.aborted.set(true);
        }
    }

    fn add_warning(&self, path: &str, diff_type: DiffType, message: String) {
        self.warnings.borrow_mut().push(WarningEntry {
            path: path.to_string(),
            diff_type,
            severity: Severity::Warning,
            message,
        });
    }

    fn add_trace(&self, path: &str, rule: &str, action: &str, details: Option<Value>) {
        if self.trace_enabled {
            self.traces.borrow_mut().push(TraceEntry {
                path: path.to_string(),
                rule: rule.to_string(),
                action: action.to_string(),
                details,
            });
        }
    }
}

fn key_spec_display(spec: &crate::path::KeySpec) -> String {
    match spec {
        crate::path::KeySpec::Single(field) => field.clone(),
        crate::path::KeySpec::Composite(fields) => fields.join(","),
    }
}

fn display_for_fingerprint(
    old_map: &std::collections::HashMap<String, Value>,
    new_map: &std::collections::HashMap<String, Value>,
    fingerprint: &str,
) -> String {
    let key: Vec<Value> = serde_json::from_str(fingerprint).unwrap_or_default();
    let _ = (old_map, new_map);
    array::format_key_value(&key)
}

fn cast_name(cast: CastType) -> &'static str {
    match cast {
        CastType::Int => "int",
        CastType::Float => "float",
        CastType::String => "string",
        CastType::Boolean => "boolean",
    }
}

/// `int`: parse as float then truncate; `float`: parse as float; `string`:
/// stringify; `boolean`: accepts `true|1|yes|on` case-insensitively. On
/// failure, the original value passes through unchanged.
fn apply_cast(value: &Value, cast: CastType) -> Value {
    match cast {
        CastType::Int => numeric_of(value)
            .map(|n| serde_json::json!(n.trunc() as i64))
            .unwrap_or_else(|| value.clone()),
        CastType::Float => numeric_of(value)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        CastType::String => Value::String(as_display_str(value)),
        CastType::Boolean => match value {
            Value::Bool(_) => value.clone(),
            Value::String(s) => {
                let lowered = s.to_ascii_lowercase();
                match lowered.as_str() {
                    "true" | "1" | "yes" | "on" => Value::Bool(true),
                    _ => Value::Bool(false),
                }
            }
            Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            other => other.clone(),
        },
    }
}

fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn as_display_str(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn as_datetime_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Booleans are never numeric; ints and floats interoperate freely.
fn types_compatible(old: &Value, new: &Value) -> bool {
    if std::mem::discriminant(old) == std::mem::discriminant(new) {
        return true;
    }
    crate::comparators::is_numeric(old) && crate::comparators::is_numeric(new)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

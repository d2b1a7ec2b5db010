//! Report types produced by a comparison run.
//!
//! Mirrors the wire-visible shape of [`DiffReport`]: every enum renders as
//! its string name, `coverage` is present only when statistics are enabled,
//! and `trace` is present only when tracing is enabled.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed taxonomy of mismatch categories a [`Differ`](crate::differ::Differ) can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffType {
    ValueMismatch,
    TypeMismatch,
    MissingInNew,
    ExtraInNew,
    ArrayLengthMismatch,
    ArrayItemMissing,
    ArrayItemExtra,
    DuplicateKey,
    SchemaMismatch,
    PrecisionExceeded,
    PatternMismatch,
    DatetimeExceeded,
}

/// Severity of a reported entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// A single difference found during comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    pub severity: Severity,
    pub old_value: Value,
    pub new_value: Value,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_applied: Option<String>,
}

/// A tolerated-but-notable observation that does not invalidate a match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub diff_type: DiffType,
    pub severity: Severity,
    pub message: String,
}

/// A record of a rule's application, emitted only when tracing is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub path: String,
    pub rule: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Execution metadata attached to every report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionInfo {
    pub duration_ms: u64,
    pub timestamp: String,
    pub engine_version: String,
}

/// Aggregate counters over a comparison run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total_fields_checked: usize,
    pub mismatches_found: usize,
    pub warnings_count: usize,
    pub fields_ignored: usize,
}

/// Schema coverage statistics, present only when statistics are enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Coverage {
    pub fields_in_schema: usize,
    pub fields_in_payload: usize,
    pub unmatched_in_old: Vec<String>,
    pub unmatched_in_new: Vec<String>,
}

/// The complete comparison report returned by [`compare`](crate::compare).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffReport {
    pub is_match: bool,
    pub execution: ExecutionInfo,
    pub summary: Summary,
    pub diffs: Vec<DiffEntry>,
    pub warnings: Vec<WarningEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<Coverage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<TraceEntry>,
}

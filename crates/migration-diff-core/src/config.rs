//! Configuration for the comparison engine.

use serde::{Deserialize, Serialize};

/// Options controlling a single [`compare`](crate::compare) invocation.
///
/// ## Serialization Format
///
/// Fields are serialized in `snake_case`, matching the wire contract used by
/// callers that persist engine configuration alongside scenario fixtures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Maximum recursion depth for both `$ref` resolution and diffing.
    /// Default: 100.
    pub max_depth: usize,
    /// Maximum serialized size (megabytes) of either input document.
    /// Default: 50.
    pub max_payload_size_mb: f64,
    /// Wall-clock budget for a single `compare` call. Default: 30.
    pub timeout_seconds: u64,
    /// Whether to compute [`Coverage`](crate::report::Coverage) statistics.
    /// Default: true.
    pub collect_statistics: bool,
    /// Whether to record [`TraceEntry`](crate::report::TraceEntry) rule-application
    /// traces. Default: false.
    pub trace_rule_application: bool,
    /// Stop enumerating further diffs after the first mismatch. Default: false.
    pub fail_fast: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            max_payload_size_mb: 50.0,
            timeout_seconds: 30,
            collect_statistics: true,
            trace_rule_application: false,
            fail_fast: false,
        }
    }
}

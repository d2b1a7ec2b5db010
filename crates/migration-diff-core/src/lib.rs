//! A schema-driven JSON equivalence engine for validating API migrations.
//!
//! Given a baseline document, a candidate document, and an OpenAPI-style
//! JSON Schema annotated with `x-migration-*` extensions, [`compare`]
//! produces a [`DiffReport`](report::DiffReport) describing every field-level
//! mismatch between the two, after normalizing away the differences the
//! schema says don't matter.
//!
//! The pipeline runs in five stages: resolve internal `$ref`s
//! ([`resolver`]), decode `x-migration-*` rules into a memoized schema index
//! ([`rules`], [`schema_index`]), rewrite both documents
//! ([`normalizer`]), strip ignored subtrees ([`masker`]), and finally walk the
//! masked pair emitting diffs ([`differ`]) through a small set of pure
//! comparators ([`comparators`]).
//!
//! This crate never validates full JSON Schema, never fetches external
//! `$ref`s, and never mutates its inputs.

pub mod comparators;
pub mod condition;
pub mod config;
pub mod differ;
pub mod error;
pub mod masker;
pub mod normalizer;
pub mod path;
pub mod report;
pub mod resolver;
pub mod rules;
pub mod schema_index;

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, info, instrument};

pub use config::EngineConfig;
pub use error::{EngineError, ErrorResponse};
pub use report::DiffReport;

use differ::Differ;
use masker::Masker;
use normalizer::Normalizer;
use report::{Coverage, ExecutionInfo, Summary};
use rules::extract_global_rules;
use schema_index::SchemaIndex;

/// Engine version string embedded in every [`ExecutionInfo`].
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compare `baseline` against `candidate` under `schema`, honoring `config`.
///
/// Returns a fully populated [`DiffReport`] on success. Returns
/// [`ErrorResponse`] when the engine itself fails — oversized payloads,
/// unresolvable `$ref`s, a recursion budget exceeded, or a wall-clock
/// timeout — as opposed to a comparison finding, which is never an error.
#[instrument(skip_all)]
pub fn compare(
    baseline: &Value,
    candidate: &Value,
    schema: &Value,
    config: &EngineConfig,
) -> Result<DiffReport, ErrorResponse> {
    run(baseline, candidate, schema, config).map_err(|err| {
        debug!(error = %err, "compare failed");
        err.to_response()
    })
}

fn run(
    baseline: &Value,
    candidate: &Value,
    schema: &Value,
    config: &EngineConfig,
) -> Result<DiffReport, EngineError> {
    let start = std::time::Instant::now();

    check_payload_size(baseline, config.max_payload_size_mb)?;
    check_payload_size(candidate, config.max_payload_size_mb)?;

    let global = extract_global_rules(schema);
    let index = SchemaIndex::new(schema, config.max_depth);

    let normalizer = Normalizer::new(&index, &global);
    let (normalized_old, normalized_new) = normalizer.normalize(baseline, candidate);

    let masker = Masker::new(&index);
    let (masked_old, masked_new, fields_ignored) = masker.mask(&normalized_old, &normalized_new);

    let differ = Differ::new(
        &index,
        &masked_old,
        &masked_new,
        config.fail_fast,
        config.trace_rule_application,
        config.max_depth,
    );
    let outcome = differ.run(&masked_old, &masked_new)?;

    check_timeout(start.elapsed(), config.timeout_seconds)?;

    let coverage = if config.collect_statistics {
        Some(compute_coverage(&masked_old, &masked_new, &outcome))
    } else {
        None
    };

    let summary = Summary {
        total_fields_checked: outcome.fields_checked,
        mismatches_found: outcome.diffs.len(),
        warnings_count: outcome.warnings.len(),
        fields_ignored,
    };

    info!(
        is_match = outcome.is_match,
        mismatches = summary.mismatches_found,
        "comparison complete"
    );

    Ok(DiffReport {
        is_match: outcome.is_match,
        execution: ExecutionInfo {
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: timestamp_rfc3339(),
            engine_version: ENGINE_VERSION.to_string(),
        },
        summary,
        diffs: outcome.diffs,
        warnings: outcome.warnings,
        coverage,
        trace: outcome.traces,
    })
}

fn check_payload_size(value: &Value, limit_mb: f64) -> Result<(), EngineError> {
    let size_mb = serde_json::to_vec(value)
        .map(|bytes| bytes.len() as f64 / (1024.0 * 1024.0))
        .unwrap_or(0.0);
    if size_mb > limit_mb {
        return Err(EngineError::PayloadSize { size_mb, limit_mb });
    }
    Ok(())
}

fn check_timeout(elapsed: std::time::Duration, timeout_seconds: u64) -> Result<(), EngineError> {
    if elapsed.as_secs() > timeout_seconds {
        return Err(EngineError::Timeout { timeout_seconds });
    }
    Ok(())
}

/// Leaf paths present on one side but not the other, reported as a coarse
/// coverage signal rather than a diff.
fn compute_coverage(old: &Value, new: &Value, _outcome: &differ::DiffOutcome) -> Coverage {
    let mut old_paths = BTreeSet::new();
    let mut new_paths = BTreeSet::new();
    collect_leaf_paths(old, "$", &mut old_paths);
    collect_leaf_paths(new, "$", &mut new_paths);

    let unmatched_in_old: Vec<String> = old_paths.difference(&new_paths).cloned().collect();
    let unmatched_in_new: Vec<String> = new_paths.difference(&old_paths).cloned().collect();

    Coverage {
        fields_in_schema: old_paths.union(&new_paths).count(),
        fields_in_payload: old_paths.len().max(new_paths.len()),
        unmatched_in_old,
        unmatched_in_new,
    }
}

fn collect_leaf_paths(value: &Value, current: &str, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = path::build_path(current, path::Key::Name(key));
                collect_leaf_paths(child, &child_path, out);
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                let child_path = path::build_path(current, path::Key::Index(i));
                collect_leaf_paths(item, &child_path, out);
            }
        }
        _ => {
            out.insert(current.to_string());
        }
    }
}

fn timestamp_rfc3339() -> String {
    chrono::DateTime::<chrono::Utc>::from(std::time::SystemTime::now())
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

//! Error types for the comparison engine.
//!
//! Two axes, per the engine design: **engine failures** (this module) short-circuit
//! [`compare`](crate::compare) and produce an [`ErrorResponse`]; comparison findings
//! (mismatches, warnings) are never exceptions and live in [`crate::report`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable, machine-readable error codes in `ErrorResponse.error.code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    ValidationError,
    SchemaParseError,
    PayloadSizeError,
    MaxDepthError,
    TimeoutError,
    ProcessingError,
}

/// A hard failure of the engine itself, as opposed to a comparison finding.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{message}")]
    Validation { message: String, details: Value },

    #[error("schema parse error at {path}: {reason}")]
    SchemaParse {
        path: String,
        reason: String,
        details: Value,
    },

    #[error("payload size ({size_mb:.2}MB) exceeds limit ({limit_mb}MB)")]
    PayloadSize { size_mb: f64, limit_mb: f64 },

    #[error("maximum depth ({max_depth}) exceeded at path: {path}")]
    MaxDepth { path: String, max_depth: usize },

    #[error("processing timeout ({timeout_seconds}s) exceeded")]
    Timeout { timeout_seconds: u64 },

    #[error("processing error: {message}")]
    Processing { message: String, kind: String },
}

impl EngineError {
    /// A `$ref` pointing outside the document (`http://`, `https://`, or any
    /// pointer not rooted at `#/`).
    pub fn external_ref(path: &str, reference: &str) -> Self {
        EngineError::SchemaParse {
            path: path.to_string(),
            reason: format!("external $ref not allowed: {reference}"),
            details: serde_json::json!({ "reference": reference }),
        }
    }

    /// A `$ref` cycle detected while resolving along the current stack.
    pub fn circular_ref(path: &str, reference: &str) -> Self {
        EngineError::SchemaParse {
            path: path.to_string(),
            reason: format!("circular reference detected at: {reference}"),
            details: serde_json::json!({ "reference": reference }),
        }
    }

    /// A `$ref` pointer that does not resolve to any node in the document.
    pub fn unresolvable_ref(path: &str, reference: &str) -> Self {
        EngineError::SchemaParse {
            path: path.to_string(),
            reason: format!("cannot resolve $ref: {reference}"),
            details: serde_json::json!({ "reference": reference }),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::SchemaParse { .. } => ErrorCode::SchemaParseError,
            EngineError::PayloadSize { .. } => ErrorCode::PayloadSizeError,
            EngineError::MaxDepth { .. } => ErrorCode::MaxDepthError,
            EngineError::Timeout { .. } => ErrorCode::TimeoutError,
            EngineError::Processing { .. } => ErrorCode::ProcessingError,
        }
    }

    fn details(&self) -> Value {
        match self {
            EngineError::Validation { details, .. } => details.clone(),
            EngineError::SchemaParse { details, .. } => details.clone(),
            EngineError::PayloadSize { size_mb, limit_mb } => {
                serde_json::json!({ "size_mb": size_mb, "limit_mb": limit_mb })
            }
            EngineError::MaxDepth { path, max_depth } => {
                serde_json::json!({ "path": path, "max_depth": max_depth })
            }
            EngineError::Timeout { timeout_seconds } => {
                serde_json::json!({ "timeout_seconds": timeout_seconds })
            }
            EngineError::Processing { kind, .. } => serde_json::json!({ "kind": kind }),
        }
    }

    /// Build the wire-visible [`ErrorResponse`] for this failure.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            success: false,
            error: Some(ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                details: self.details(),
            }),
        }
    }
}

/// The structured error returned by `compare` on engine failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_value(ErrorCode::MaxDepthError).unwrap();
        assert_eq!(json, serde_json::json!("MAX_DEPTH_ERROR"));
    }

    #[test]
    fn payload_size_error_to_response_carries_details() {
        let err = EngineError::PayloadSize {
            size_mb: 60.5,
            limit_mb: 50.0,
        };
        let response = err.to_response();
        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::PayloadSizeError);
        assert_eq!(error.details["limit_mb"], serde_json::json!(50.0));
    }

    #[test]
    fn external_ref_error_is_schema_parse_error() {
        let err = EngineError::external_ref("$.foo", "https://example.com/schema");
        assert_eq!(err.code(), ErrorCode::SchemaParseError);
        assert!(err.to_string().contains("external $ref"));
    }
}

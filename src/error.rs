//! Error types for the generation orchestration layer.
//!
//! `ApiError` carries the concrete failure; `ErrorKind` is the coarse class the
//! invocation gateway uses to decide between backoff, cascade skip and propagation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Retry-relevant classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Rate limit, quota or server overload: back off and retry the same model.
    Transient,
    /// The model identifier is unsupported or unknown: move to the next model.
    ModelUnavailable,
    /// Anything else: surface to the caller without further attempts.
    NonRetriable,
    /// Model output could not be turned into the expected structure.
    ParseFailure,
}

/// Substrings that mark a rate-limit, quota or overload failure.
const TRANSIENT_SIGNATURES: &[&str] = &[
    "429",
    "quota",
    "rate limit",
    "rate_limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "503",
    "overloaded",
    "service unavailable",
    "high demand",
];

/// Phrases that mark an unsupported or unknown model when the message names a model.
const MODEL_UNAVAILABLE_PHRASES: &[&str] = &[
    "not found",
    "not_found",
    "is not supported",
    "not supported for",
    "unsupported",
];

/// A 404 status as the leading token or as an explicit `status`/`code` field.
fn not_found_status() -> &'static Regex {
    static STATUS: OnceLock<Regex> = OnceLock::new();
    STATUS.get_or_init(|| {
        Regex::new(concat!(
            r#"^\s*(?:http\s+|error\s*:?\s*)?404\b"#,
            r#"|\b(?:status|code)["']?\s*[:=]?\s*404\b"#,
        ))
        .expect("valid status regex")
    })
}

fn is_model_unavailable(lowered: &str) -> bool {
    if not_found_status().is_match(lowered) {
        return true;
    }
    if lowered.contains("not supported for generatecontent") {
        return true;
    }
    lowered.contains("model")
        && MODEL_UNAVAILABLE_PHRASES
            .iter()
            .any(|phrase| lowered.contains(phrase))
}

/// Classify a free-form error message by its known signatures.
///
/// Model-unavailable signatures are checked first so that a "404 model not found"
/// body that happens to mention quota does not trigger a backoff. A bare "404" or
/// "not found" elsewhere in the text (request ids, missing projects) does not count.
pub fn classify_message(message: &str) -> ErrorKind {
    let lowered = message.to_ascii_lowercase();
    if is_model_unavailable(&lowered) {
        return ErrorKind::ModelUnavailable;
    }
    if TRANSIENT_SIGNATURES.iter().any(|sig| lowered.contains(sig)) {
        return ErrorKind::Transient;
    }
    ErrorKind::NonRetriable
}

/// Errors raised by the gateway, adapters, pipeline, pattern mapper and artifact model.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Request failed: {0}")]
    NonRetriable(String),

    /// Raw provider error text that has not been classified yet.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Failed to parse model output: {0}")]
    ParseFailure(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("No image generated by model {0}")]
    NoImageGenerated(String),

    #[error("Reference fetch failed for {url}: {reason}")]
    ReferenceFetch { url: String, reason: String },

    #[error("Model cascade is empty")]
    EmptyCascade,

    #[error("Stage '{stage}' requires '{missing}' to complete first")]
    StageNotReady { stage: String, missing: String },

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact is not editable: {0}")]
    ArtifactNotEditable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Map the error onto the gateway's retry classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transient(_) => ErrorKind::Transient,
            ApiError::ModelUnavailable(_) => ErrorKind::ModelUnavailable,
            ApiError::Provider(message) => classify_message(message),
            ApiError::ParseFailure(_) => ErrorKind::ParseFailure,
            // Includes NoImageGenerated and Timeout: surfaced to the caller as-is.
            _ => ErrorKind::NonRetriable,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::ParseFailure(err.to_string())
    }
}

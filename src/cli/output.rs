//! CLI output: error mapping and JSON rendering.

use crate::error::ApiError;
use serde::Serialize;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::ConfigError(msg) => format!(
            "Configuration error: {}\nRun `genflow config validate` for details.",
            msg
        ),
        other => other.to_string(),
    }
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::NonRetriable(format!("Failed to render output: {}", e)))
}

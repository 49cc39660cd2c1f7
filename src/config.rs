//! Configuration System
//!
//! Layered configuration for the generation orchestration layer: provider endpoint and
//! credentials, model cascades, gateway retry policy, synthesis timeout, reference fetch
//! limits and logging. Sources merge as defaults, global file, workspace files, then
//! `GENFLOW__*` environment variables.

use crate::adapter::ModelCatalog;
use crate::error::ApiError;
use crate::gateway::RetryPolicy;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use crate::provider::ProviderSettings;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenflowConfig {
    /// Generative service endpoint and credentials
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Model cascades per modality
    #[serde(default)]
    pub models: ModelCatalog,

    /// Retry and backoff settings for the invocation gateway
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Image synthesis settings
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// Reference image fetch limits
    #[serde(default)]
    pub references: ReferenceSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Invocation gateway settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Attempts per model before the cascade advances
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_model: u32,

    /// Delay before the second attempt; doubles on every further attempt
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Optional per-attempt timeout
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            max_attempts_per_model: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            attempt_timeout_secs: None,
        }
    }
}

impl GatewaySettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts_per_model: self.max_attempts_per_model,
            base_backoff: Duration::from_millis(self.base_backoff_ms),
        }
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs.map(Duration::from_secs)
    }
}

/// Image synthesis settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Hard timeout raced against each synthesis call
    #[serde(default = "default_synthesis_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_synthesis_timeout_secs() -> u64 {
    60
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_synthesis_timeout_secs(),
        }
    }
}

impl SynthesisSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Reference image fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceSettings {
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Responses larger than this are dropped
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_max_bytes() -> usize {
    8 * 1024 * 1024 // 8 MB
}

fn default_user_agent() -> String {
    format!("genflow/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ReferenceSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_bytes: default_max_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Provider(String),
    Models(String),
    Gateway(String),
    Synthesis(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Models(msg) => write!(f, "Models: {}", msg),
            ValidationError::Gateway(msg) => write!(f, "Gateway: {}", msg),
            ValidationError::Synthesis(msg) => write!(f, "Synthesis: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl GenflowConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::Provider(e));
        }

        if let Err(e) = self.models.validate() {
            errors.push(ValidationError::Models(e));
        }

        if self.gateway.max_attempts_per_model == 0 {
            errors.push(ValidationError::Gateway(
                "max_attempts_per_model must be at least 1".to_string(),
            ));
        }
        if self.gateway.attempt_timeout_secs == Some(0) {
            errors.push(ValidationError::Gateway(
                "attempt_timeout_secs cannot be 0".to_string(),
            ));
        }

        if self.synthesis.timeout_secs == 0 {
            errors.push(ValidationError::Synthesis(
                "timeout_secs cannot be 0".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ApiError> {
        toml::to_string_pretty(self)
            .map_err(|e| ApiError::ConfigError(format!("Failed to render config: {}", e)))
    }
}

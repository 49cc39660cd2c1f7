//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("gateway.max_attempts_per_model", 3)?
        .set_default("gateway.base_backoff_ms", 1000)?
        .set_default("synthesis.timeout_secs", 60)
}

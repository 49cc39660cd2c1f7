//! Config loading facade: assembles sources in precedence order and deserializes.

use super::merge::merge_policy;
use super::sources::{global_file, workspace_file};
use super::GenflowConfig;
use config::{ConfigError, Environment, File};
use std::path::Path;

/// Loads `GenflowConfig` from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace.
    ///
    /// Precedence (lowest to highest): defaults, global file, workspace
    /// `config/config.toml`, `config/{GENFLOW_ENV}.toml`, `GENFLOW__*` env vars.
    pub fn load(workspace_root: &Path) -> Result<GenflowConfig, ConfigError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }

    /// Load configuration from a single explicit file, still honouring env overrides.
    pub fn load_from_file(path: &Path) -> Result<GenflowConfig, ConfigError> {
        merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?
            .try_deserialize()
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("GENFLOW")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("models.text")
        .with_list_parse_key("models.analysis")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn workspace_env_file_overrides_base_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_dir = temp_dir.path().join("config");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            "[gateway]\nbase_backoff_ms = 500\nmax_attempts_per_model = 4\n",
        )
        .unwrap();
        std::fs::write(
            config_dir.join("development.toml"),
            "[gateway]\nbase_backoff_ms = 50\n",
        )
        .unwrap();

        let config = ConfigLoader::load(temp_dir.path()).unwrap();
        assert_eq!(config.gateway.max_attempts_per_model, 4);
        assert_eq!(config.gateway.base_backoff_ms, 50);
    }

    #[test]
    fn missing_workspace_files_fall_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::load(temp_dir.path()).unwrap();
        assert_eq!(config.synthesis.timeout_secs, 60);
        assert_eq!(config.gateway.max_attempts_per_model, 3);
    }
}

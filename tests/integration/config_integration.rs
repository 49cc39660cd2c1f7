//! Integration tests for configuration loading

use genflow::adapter::Adapters;
use genflow::config::ConfigLoader;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn config_file_drives_cascades_and_timeouts() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("genflow.toml");
    std::fs::write(
        &config_file,
        r#"
[models]
text = ["primary", "secondary"]
image = "image-model"

[gateway]
max_attempts_per_model = 2
base_backoff_ms = 250

[synthesis]
timeout_secs = 30

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.models.text, vec!["primary", "secondary"]);
    assert_eq!(config.gateway.retry_policy().max_attempts_per_model, 2);
    assert_eq!(
        config.gateway.retry_policy().delay_for_attempt(2),
        Duration::from_millis(500)
    );
    assert_eq!(config.synthesis.timeout(), Duration::from_secs(30));
    assert_eq!(config.logging.format, "json");

    // Unset sections keep their defaults
    assert_eq!(config.models.analysis.len(), 3);
    assert_eq!(config.references.fetch_timeout_secs, 15);
}

#[test]
fn workspace_config_directory_is_layered() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "[gateway]\nbase_backoff_ms = 10\n",
    )
    .unwrap();

    let config = ConfigLoader::load(temp_dir.path()).unwrap();
    assert_eq!(config.gateway.base_backoff_ms, 10);
    assert_eq!(config.gateway.max_attempts_per_model, 3);
}

#[test]
fn adapters_follow_loaded_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("genflow.toml");
    std::fs::write(&config_file, "[models]\ntext = [\"only\"]\n").unwrap();
    let config = ConfigLoader::load_from_file(&config_file).unwrap();

    let client = std::sync::Arc::new(super::test_utils::ScriptedClient::new());
    let adapters = Adapters::from_config(client, &config);
    assert_eq!(adapters.text.cascade(), ["only".to_string()]);
    assert_eq!(adapters.synthesis.model(), "gemini-2.5-flash-image-preview");
}

#[test]
fn invalid_values_are_reported() {
    let temp_dir = TempDir::new().unwrap();
    let config_file = temp_dir.path().join("genflow.toml");
    std::fs::write(
        &config_file,
        "[models]\ntext = []\n\n[gateway]\nmax_attempts_per_model = 0\n",
    )
    .unwrap();
    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
}

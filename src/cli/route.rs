//! CLI route: single route table and run context.

use crate::api::{ActionResponse, StudioApi};
use crate::artifact::{self, ContentPath};
use crate::config::{ConfigLoader, GenflowConfig};
use crate::error::ApiError;
use crate::gateway::GeneratedOutput;
use crate::provider::InlineImage;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::cli::output::to_json;
use crate::cli::parse::{ArtifactCommands, Commands, ConfigCommands};

/// Rendered command result
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub text: String,
    /// False when the command ran but its action failed
    pub success: bool,
}

impl CommandOutput {
    fn ok(text: String) -> Self {
        Self {
            text,
            success: true,
        }
    }

    fn from_response<T: serde::Serialize>(response: &ActionResponse<T>) -> Result<Self, ApiError> {
        Ok(Self {
            text: to_json(response)?,
            success: response.success,
        })
    }
}

/// Runtime context for CLI execution: effective config plus an async runtime.
pub struct RunContext {
    config: GenflowConfig,
    workspace_root: PathBuf,
    runtime: Runtime,
}

impl RunContext {
    /// Create run context from workspace root and optional config path. Uses ConfigLoader only.
    pub fn new(workspace_root: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ApiError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&workspace_root)?
        };
        let runtime = Runtime::new()
            .map_err(|e| ApiError::ConfigError(format!("Failed to start async runtime: {}", e)))?;
        Ok(Self {
            config,
            workspace_root,
            runtime,
        })
    }

    pub fn config(&self) -> &GenflowConfig {
        &self.config
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn studio(&self) -> Result<StudioApi, ApiError> {
        StudioApi::from_config(&self.config)
    }

    pub fn execute(&self, command: &Commands) -> Result<CommandOutput, ApiError> {
        match command {
            Commands::Text {
                prompt,
                temperature,
            } => {
                let api = self.studio()?;
                let response = self
                    .runtime
                    .block_on(api.generate_text(prompt, *temperature));
                CommandOutput::from_response(&response)
            }
            Commands::Analyze {
                prompt,
                images,
                temperature,
            } => {
                let api = self.studio()?;
                let images = images
                    .iter()
                    .map(|path| read_image(path))
                    .collect::<Result<Vec<_>, _>>()?;
                let response = self
                    .runtime
                    .block_on(api.analyze_images(prompt, &images, *temperature));
                CommandOutput::from_response(&response)
            }
            Commands::Image {
                prompt,
                references,
                output,
            } => {
                let api = self.studio()?;
                let response = self
                    .runtime
                    .block_on(api.synthesize_image(prompt, references));
                match (output, response.data.as_ref()) {
                    (Some(path), Some(invocation)) => {
                        let GeneratedOutput::Image(image) = &invocation.value else {
                            return Err(ApiError::NoImageGenerated(invocation.model.clone()));
                        };
                        std::fs::write(path, image.decode()?)?;
                        info!(path = %path.display(), "Image written");
                        let written = ActionResponse::ok(path.display().to_string());
                        CommandOutput::from_response(&written)
                    }
                    _ => CommandOutput::from_response(&response),
                }
            }
            Commands::Artifact { command } => self.handle_artifact_command(command),
            Commands::Config { command } => self.handle_config_command(command),
        }
    }

    fn handle_artifact_command(
        &self,
        command: &ArtifactCommands,
    ) -> Result<CommandOutput, ApiError> {
        match command {
            ArtifactCommands::Extract { file } => {
                let content = read_json(file)?;
                Ok(CommandOutput::ok(to_json(&artifact::extract(&content))?))
            }
            ArtifactCommands::Patch {
                file,
                text,
                text_file,
                path,
                in_place,
            } => {
                let original = read_json(file)?;
                let new_text = match (text, text_file) {
                    (Some(text), _) => text.clone(),
                    (None, Some(text_file)) => std::fs::read_to_string(text_file)?,
                    (None, None) => {
                        return Err(ApiError::ArtifactNotEditable(
                            "provide --text or --text-file".to_string(),
                        ))
                    }
                };
                let content_path = match path {
                    Some(path) => path.parse::<ContentPath>()?,
                    None => artifact::extract(&original).content_path,
                };
                debug!(file = %file.display(), path = %content_path, "Patching artifact");
                let patched = artifact::patch(&original, &new_text, content_path)?;
                let rendered = to_json(&patched)?;
                if *in_place {
                    std::fs::write(file, format!("{}\n", rendered))?;
                    Ok(CommandOutput::ok(format!("Patched {}", file.display())))
                } else {
                    Ok(CommandOutput::ok(rendered))
                }
            }
        }
    }

    fn handle_config_command(&self, command: &ConfigCommands) -> Result<CommandOutput, ApiError> {
        match command {
            ConfigCommands::Show => Ok(CommandOutput::ok(self.config.to_toml()?)),
            ConfigCommands::Validate => match self.config.validate() {
                Ok(()) => Ok(CommandOutput::ok("Configuration is valid".to_string())),
                Err(errors) => {
                    let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
                    Err(ApiError::ConfigError(format!(
                        "{} problem(s):\n{}",
                        errors.len(),
                        lines.join("\n")
                    )))
                }
            },
        }
    }
}

fn read_json(path: &Path) -> Result<Value, ApiError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| {
        ApiError::ParseFailure(format!("{} is not valid JSON: {}", path.display(), e))
    })
}

/// MIME type from a file extension; unknown extensions are rejected.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

fn read_image(path: &Path) -> Result<InlineImage, ApiError> {
    let mime = mime_for_path(path).ok_or_else(|| {
        ApiError::NonRetriable(format!("Unsupported image type: {}", path.display()))
    })?;
    let bytes = std::fs::read(path)?;
    Ok(InlineImage::from_bytes(mime, &bytes))
}

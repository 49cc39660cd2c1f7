//! CLI parse: clap types for genflow. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// genflow CLI - resilient generation orchestration
#[derive(Parser)]
#[command(name = "genflow")]
#[command(about = "Retrying, model-cascading generation with artifact editing")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ is read from here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate text through the text model cascade
    Text {
        prompt: String,
        #[arg(long, default_value = "0.7")]
        temperature: f32,
    },
    /// Analyze local images with a prompt
    Analyze {
        prompt: String,
        /// Image file (repeatable)
        #[arg(long = "image", required = true)]
        images: Vec<PathBuf>,
        #[arg(long, default_value = "0.4")]
        temperature: f32,
    },
    /// Synthesize an image, optionally steered by reference images
    Image {
        prompt: String,
        /// Reference image URL, page URL or data URI (repeatable)
        #[arg(long = "reference")]
        references: Vec<String>,
        /// Write the decoded image here instead of printing a data URI
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Inspect and edit persisted artifact JSON
    Artifact {
        #[command(subcommand)]
        command: ArtifactCommands,
    },
    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ArtifactCommands {
    /// Show the editable projection of an artifact file
    Extract { file: PathBuf },
    /// Write edited text back into an artifact file
    Patch {
        file: PathBuf,
        /// New text
        #[arg(long, conflicts_with = "text_file")]
        text: Option<String>,
        /// Read the new text from a file
        #[arg(long)]
        text_file: Option<PathBuf>,
        /// Content path (root, finalScript, content); detected when omitted
        #[arg(long)]
        path: Option<String>,
        /// Overwrite the artifact file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}

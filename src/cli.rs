//! CLI domain: parse, route and output only.
//! No orchestration here; the route table dispatches to `StudioApi` and the artifact model.

mod output;
mod parse;
mod route;

pub use output::{map_error, to_json};
pub use parse::{ArtifactCommands, Cli, Commands, ConfigCommands};
pub use route::{mime_for_path, CommandOutput, RunContext};

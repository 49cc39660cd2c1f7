//! Stage and workflow definitions.

use super::context::{PipelineContext, StageKey};
use crate::error::ApiError;
use crate::provider::InlineImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which adapter a stage calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Text,
    /// Prompt plus the stage input's images
    Analysis,
}

/// How a stage's raw output is interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponseFormat {
    /// Keep the raw text only
    Text,
    /// Parse JSON; substitute `default` when the output is unusable
    Json { default: Value },
    /// Parse JSON; regenerate up to `max_extra_attempts` times before failing
    StrictJson { max_extra_attempts: u32 },
}

/// New caller input for one stage run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageInput {
    pub text: Option<String>,
    #[serde(default)]
    pub images: Vec<InlineImage>,
}

impl StageInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            images: Vec::new(),
        }
    }

    pub fn images(images: Vec<InlineImage>) -> Self {
        Self { text: None, images }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Trimmed text, if any was given
    pub fn note(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Builds a stage prompt from prior outputs and the new input.
pub type PromptBuilder<S> = fn(&PipelineContext<S>, &StageInput) -> Result<String, ApiError>;

/// One named stage of a workflow
#[derive(Clone)]
pub struct StageDefinition<S: StageKey> {
    pub key: S,
    /// Stages whose outputs the prompt reads
    pub requires: &'static [S],
    pub modality: Modality,
    pub format: ResponseFormat,
    pub temperature: f32,
    pub build_prompt: PromptBuilder<S>,
}

impl<S: StageKey> std::fmt::Debug for StageDefinition<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDefinition")
            .field("key", &self.key)
            .field("requires", &self.requires)
            .field("modality", &self.modality)
            .field("format", &self.format)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

/// Fixed, ordered list of stages
#[derive(Debug, Clone)]
pub struct Workflow<S: StageKey> {
    pub name: &'static str,
    stages: Vec<StageDefinition<S>>,
}

impl<S: StageKey> Workflow<S> {
    pub fn new(name: &'static str, stages: Vec<StageDefinition<S>>) -> Self {
        Self { name, stages }
    }

    pub fn stages(&self) -> &[StageDefinition<S>] {
        &self.stages
    }

    pub fn stage(&self, key: S) -> Result<&StageDefinition<S>, ApiError> {
        self.stages
            .iter()
            .find(|s| s.key == key)
            .ok_or_else(|| ApiError::UnknownStage(format!("{}/{}", self.name, key.name())))
    }

    /// Look a stage up by its name, e.g. from a request path.
    pub fn stage_by_name(&self, name: &str) -> Result<S, ApiError> {
        self.stages
            .iter()
            .map(|s| s.key)
            .find(|k| k.name() == name)
            .ok_or_else(|| ApiError::UnknownStage(format!("{}/{}", self.name, name)))
    }

    /// First stage in workflow order without an output.
    pub fn next_pending(&self, ctx: &PipelineContext<S>) -> Option<S> {
        self.stages
            .iter()
            .map(|s| s.key)
            .find(|k| !ctx.is_complete(*k))
    }

    /// Missing prerequisite of `key`, if any.
    pub fn missing_prerequisite(
        &self,
        ctx: &PipelineContext<S>,
        key: S,
    ) -> Result<Option<S>, ApiError> {
        Ok(self
            .stage(key)?
            .requires
            .iter()
            .copied()
            .find(|r| !ctx.is_complete(*r)))
    }
}

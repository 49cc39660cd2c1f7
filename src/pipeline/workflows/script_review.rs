//! Script review: structure analysis through to a rewritten final script.
//!
//! The script under review is the context's source. Each stage reads the outputs of
//! the stages before it; the final stage produces the script that gets saved.

use crate::artifact::ArtifactContent;
use crate::error::ApiError;
use crate::parse::{self, DEFAULT_MAX_EXTRA_ATTEMPTS};
use crate::pipeline::context::{PipelineContext, StageKey};
use crate::pipeline::stage::{Modality, ResponseFormat, StageDefinition, StageInput, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const NAME: &str = "script_review";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStage {
    StructureAnalysis,
    AudienceAnalysis,
    DeepAnalysis,
    ImprovementProposal,
    FinalWrite,
}

impl StageKey for ScriptStage {
    fn name(&self) -> &'static str {
        match self {
            ScriptStage::StructureAnalysis => "structure_analysis",
            ScriptStage::AudienceAnalysis => "audience_analysis",
            ScriptStage::DeepAnalysis => "deep_analysis",
            ScriptStage::ImprovementProposal => "improvement_proposal",
            ScriptStage::FinalWrite => "final_write",
        }
    }
}

pub type ScriptContext = PipelineContext<ScriptStage>;

/// Start a review of `script`.
pub fn new_context(script: impl Into<String>) -> ScriptContext {
    PipelineContext::new(NAME).with_source(script)
}

fn script(ctx: &ScriptContext, stage: ScriptStage) -> Result<&str, ApiError> {
    ctx.source()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::StageNotReady {
            stage: stage.name().to_string(),
            missing: "source script".to_string(),
        })
}

fn with_notes(mut prompt: String, input: &StageInput) -> String {
    if let Some(note) = input.note() {
        prompt.push_str("\n\nReviewer notes:\n");
        prompt.push_str(note);
    }
    prompt
}

fn structure_prompt(ctx: &ScriptContext, input: &StageInput) -> Result<String, ApiError> {
    let script = script(ctx, ScriptStage::StructureAnalysis)?;
    Ok(with_notes(
        format!(
            "Analyze the structure of this video script. Identify the hook, each section and \
             the call to action.\n\
             Respond with JSON: {{\"hook\": \"...\", \"sections\": [{{\"title\": \"...\", \
             \"summary\": \"...\"}}], \"callToAction\": \"...\"}}\n\n\
             Script:\n{script}"
        ),
        input,
    ))
}

fn audience_prompt(ctx: &ScriptContext, input: &StageInput) -> Result<String, ApiError> {
    let script = script(ctx, ScriptStage::AudienceAnalysis)?;
    let structure =
        ctx.require_text(ScriptStage::AudienceAnalysis, ScriptStage::StructureAnalysis)?;
    Ok(with_notes(
        format!(
            "Given the script and its structure, describe the intended audience: their level, \
             motivation and likely objections.\n\n\
             Structure analysis:\n{structure}\n\nScript:\n{script}"
        ),
        input,
    ))
}

fn deep_prompt(ctx: &ScriptContext, input: &StageInput) -> Result<String, ApiError> {
    let script = script(ctx, ScriptStage::DeepAnalysis)?;
    let structure = ctx.require_text(ScriptStage::DeepAnalysis, ScriptStage::StructureAnalysis)?;
    let audience = ctx.require_text(ScriptStage::DeepAnalysis, ScriptStage::AudienceAnalysis)?;
    Ok(with_notes(
        format!(
            "Critique the script for this audience: pacing, clarity, persuasion and retention \
             risks. Quote the passages you refer to.\n\n\
             Structure analysis:\n{structure}\n\nAudience analysis:\n{audience}\n\nScript:\n{script}"
        ),
        input,
    ))
}

fn proposal_prompt(ctx: &ScriptContext, input: &StageInput) -> Result<String, ApiError> {
    let deep = ctx.require_text(ScriptStage::ImprovementProposal, ScriptStage::DeepAnalysis)?;
    Ok(with_notes(
        format!(
            "Turn this critique into concrete improvement proposals.\n\
             Respond with JSON only: {{\"proposals\": [{{\"target\": \"...\", \"change\": \"...\", \
             \"reason\": \"...\"}}]}}\n\n\
             Critique:\n{deep}"
        ),
        input,
    ))
}

fn final_prompt(ctx: &ScriptContext, input: &StageInput) -> Result<String, ApiError> {
    let script = script(ctx, ScriptStage::FinalWrite)?;
    let proposals = ctx.require_text(ScriptStage::FinalWrite, ScriptStage::ImprovementProposal)?;
    Ok(with_notes(
        format!(
            "Rewrite the script applying the accepted proposals. Keep the speaker's voice. \
             Output only the final script text.\n\n\
             Proposals:\n{proposals}\n\nOriginal script:\n{script}"
        ),
        input,
    ))
}

pub fn workflow() -> Workflow<ScriptStage> {
    Workflow::new(
        NAME,
        vec![
            StageDefinition {
                key: ScriptStage::StructureAnalysis,
                requires: &[],
                modality: Modality::Text,
                format: ResponseFormat::Json {
                    default: json!({ "hook": "", "sections": [], "callToAction": "" }),
                },
                temperature: 0.3,
                build_prompt: structure_prompt,
            },
            StageDefinition {
                key: ScriptStage::AudienceAnalysis,
                requires: &[ScriptStage::StructureAnalysis],
                modality: Modality::Text,
                format: ResponseFormat::Text,
                temperature: 0.5,
                build_prompt: audience_prompt,
            },
            StageDefinition {
                key: ScriptStage::DeepAnalysis,
                requires: &[ScriptStage::StructureAnalysis, ScriptStage::AudienceAnalysis],
                modality: Modality::Text,
                format: ResponseFormat::Text,
                temperature: 0.5,
                build_prompt: deep_prompt,
            },
            StageDefinition {
                key: ScriptStage::ImprovementProposal,
                requires: &[ScriptStage::DeepAnalysis],
                modality: Modality::Text,
                format: ResponseFormat::StrictJson {
                    max_extra_attempts: DEFAULT_MAX_EXTRA_ATTEMPTS,
                },
                temperature: 0.4,
                build_prompt: proposal_prompt,
            },
            StageDefinition {
                key: ScriptStage::FinalWrite,
                requires: &[ScriptStage::ImprovementProposal],
                modality: Modality::Text,
                format: ResponseFormat::Text,
                temperature: 0.7,
                build_prompt: final_prompt,
            },
        ],
    )
}

/// Saved form of a finished review, once the final stage has run.
pub fn final_artifact(ctx: &ScriptContext) -> Option<ArtifactContent> {
    let final_script = parse::strip_code_fences(ctx.text(ScriptStage::FinalWrite)?);
    let mut extra = Map::new();
    if let Some(Value::Object(proposals)) = ctx.parsed(ScriptStage::ImprovementProposal) {
        if let Some(list) = proposals.get("proposals") {
            extra.insert("proposals".to_string(), list.clone());
        }
    }
    Some(ArtifactContent::FinalScript {
        final_script,
        extra,
    })
}

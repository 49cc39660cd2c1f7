//! Banner workflow: pattern analysis of example banners, then copy drafting.

use crate::error::ApiError;
use crate::pattern::{self, Pattern};
use crate::pipeline::context::{PipelineContext, StageKey};
use crate::pipeline::stage::{Modality, ResponseFormat, StageDefinition, StageInput, Workflow};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const NAME: &str = "banner";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerStage {
    PatternAnalysis,
    CopyDraft,
}

impl StageKey for BannerStage {
    fn name(&self) -> &'static str {
        match self {
            BannerStage::PatternAnalysis => "pattern_analysis",
            BannerStage::CopyDraft => "copy_draft",
        }
    }
}

pub type BannerContext = PipelineContext<BannerStage>;

fn pattern_prompt(_ctx: &BannerContext, input: &StageInput) -> Result<String, ApiError> {
    if input.images.len() < pattern::MIN_SUPPORTING_SOURCES {
        return Err(ApiError::NonRetriable(format!(
            "Pattern analysis needs at least {} images, got {}",
            pattern::MIN_SUPPORTING_SOURCES,
            input.images.len()
        )));
    }
    Ok(pattern::classification_prompt(input.images.len(), input.note()))
}

fn copy_prompt(ctx: &BannerContext, input: &StageInput) -> Result<String, ApiError> {
    let patterns = ctx.require_text(BannerStage::CopyDraft, BannerStage::PatternAnalysis)?;
    let brief = input.note().unwrap_or("a new online course");
    Ok(format!(
        "Write banner copy for {brief}, matching the tone of these visual patterns.\n\
         Respond with JSON: {{\"headline\": \"...\", \"subcopy\": \"...\", \"cta\": \"...\"}}\n\n\
         Patterns:\n{patterns}"
    ))
}

pub fn workflow() -> Workflow<BannerStage> {
    Workflow::new(
        NAME,
        vec![
            StageDefinition {
                key: BannerStage::PatternAnalysis,
                requires: &[],
                modality: Modality::Analysis,
                format: ResponseFormat::Json {
                    default: json!({ "patterns": [] }),
                },
                temperature: 0.4,
                build_prompt: pattern_prompt,
            },
            StageDefinition {
                key: BannerStage::CopyDraft,
                requires: &[BannerStage::PatternAnalysis],
                modality: Modality::Text,
                format: ResponseFormat::Json {
                    default: json!({ "headline": "", "subcopy": "", "cta": "" }),
                },
                temperature: 0.8,
                build_prompt: copy_prompt,
            },
        ],
    )
}

/// Patterns found by the analysis stage, for `source_count` analyzed images.
pub fn patterns(ctx: &BannerContext, source_count: usize) -> Vec<Pattern> {
    ctx.text(BannerStage::PatternAnalysis)
        .map(|raw| pattern::parse_patterns(raw, source_count))
        .unwrap_or_default()
}

//! Pattern classification and reference mapping
//!
//! A multimodal analysis groups source images into visual patterns. Each pattern names
//! the 1-based positions of the source images it was derived from; the mapper later
//! fetches exactly those images as references for image synthesis.

pub mod fetch;
pub mod mapper;

pub use fetch::{find_og_image, HttpReferenceFetcher, ReferenceFetcher, ReferenceImage};
pub use mapper::{resolve_sources, PatternReferenceMapper, FALLBACK_REFERENCE_COUNT};

use crate::adapter::AnalysisAdapter;
use crate::error::ApiError;
use crate::parse;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A pattern must be backed by at least this many distinct source images.
pub const MIN_SUPPORTING_SOURCES: usize = 2;

const ANALYSIS_TEMPERATURE: f32 = 0.4;

/// Cluster of shared visual characteristics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pattern {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// e.g. layout, color, typography, imagery, tone
    #[serde(default)]
    pub characteristics: IndexMap<String, Value>,
    /// 1-based positions in the source list
    pub source_indices: Vec<usize>,
}

impl Pattern {
    /// Style summary for use inside a synthesis prompt.
    pub fn style_brief(&self) -> String {
        let mut lines = vec![format!("Pattern: {}", self.name)];
        if let Some(description) = &self.description {
            lines.push(description.clone());
        }
        for (key, value) in &self.characteristics {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            lines.push(format!("- {}: {}", key, rendered));
        }
        lines.join("\n")
    }
}

/// Loose model output for one pattern
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPattern {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    characteristics: Value,
    #[serde(default, alias = "imageIndices", alias = "indices", alias = "images")]
    source_indices: Vec<Value>,
}

fn index_value(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

/// Key the characteristics however the model chose to send them.
///
/// Objects are kept as-is, list items get 1-based numeric keys and a lone scalar is
/// stored under `summary`.
fn normalize_characteristics(value: Value) -> IndexMap<String, Value> {
    match value {
        Value::Null => IndexMap::new(),
        Value::Object(map) => map.into_iter().collect(),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| ((i + 1).to_string(), item))
            .collect(),
        scalar => IndexMap::from([("summary".to_string(), scalar)]),
    }
}

/// Build patterns from analysis output.
///
/// Accepts `{"patterns": [...]}` or a bare array. Indices are deduplicated and
/// out-of-range ones removed; patterns left with fewer than two are discarded.
pub fn parse_patterns(raw: &str, source_count: usize) -> Vec<Pattern> {
    let value: Value = parse::parse_or_default(raw, json!({ "patterns": [] }));
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("patterns") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| match serde_json::from_value::<RawPattern>(item) {
            Ok(raw) => Some((i, raw)),
            Err(err) => {
                debug!(position = i, error = %err, "Skipping malformed pattern");
                None
            }
        })
        .filter_map(|(i, raw)| {
            let mut indices = Vec::new();
            for index in raw.source_indices.iter().filter_map(index_value) {
                if (1..=source_count).contains(&index) && !indices.contains(&index) {
                    indices.push(index);
                }
            }
            let name = raw
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Pattern {}", i + 1));
            if indices.len() < MIN_SUPPORTING_SOURCES {
                debug!(
                    pattern = %name,
                    supporting = indices.len(),
                    "Discarding weakly supported pattern"
                );
                return None;
            }
            Some(Pattern {
                name,
                description: raw.description,
                characteristics: normalize_characteristics(raw.characteristics),
                source_indices: indices,
            })
        })
        .collect()
}

/// Prompt asking the analysis model to group `image_count` images into patterns.
pub fn classification_prompt(image_count: usize, note: Option<&str>) -> String {
    let mut prompt = format!(
        "You are given {image_count} banner images, numbered 1 to {image_count} in the order attached.\n\
         Group them into visual patterns that share layout, color, typography, imagery and tone.\n\
         Only report a pattern if at least {MIN_SUPPORTING_SOURCES} images share it.\n\
         Respond with JSON only, in this form:\n\
         {{\"patterns\": [{{\"name\": \"...\", \"description\": \"...\", \
         \"characteristics\": {{\"layout\": \"...\", \"color\": \"...\", \"typography\": \"...\", \
         \"imagery\": \"...\", \"tone\": \"...\"}}, \"sourceIndices\": [1, 2]}}]}}"
    );
    if let Some(note) = note {
        prompt.push_str("\n\nAdditional guidance: ");
        prompt.push_str(note);
    }
    prompt
}

/// Result of one classification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub patterns: Vec<Pattern>,
    pub model: String,
    /// Sources that could not be fetched and were left out of the analysis
    pub skipped_sources: Vec<usize>,
}

/// Classifies source images into patterns.
#[derive(Clone)]
pub struct PatternClassifier {
    analysis: AnalysisAdapter,
    mapper: PatternReferenceMapper,
}

impl PatternClassifier {
    pub fn new(analysis: AnalysisAdapter, fetcher: Arc<dyn ReferenceFetcher>) -> Self {
        Self {
            analysis,
            mapper: PatternReferenceMapper::new(fetcher),
        }
    }

    pub fn mapper(&self) -> &PatternReferenceMapper {
        &self.mapper
    }

    /// Fetch the sources, analyze them together and return the surviving patterns.
    ///
    /// Indices in the result always refer to `sources`, even when some sources could
    /// not be fetched and the model saw fewer images.
    pub async fn classify(
        &self,
        sources: &[String],
        note: Option<&str>,
    ) -> Result<Classification, ApiError> {
        let urls: Vec<&str> = sources.iter().map(String::as_str).collect();
        let fetched = self.mapper.fetch_indexed(&urls).await;

        // Source position (1-based) of each submitted image
        let submitted_positions: Vec<usize> = fetched.iter().map(|(p, _)| p + 1).collect();
        let images: Vec<_> = fetched.iter().map(|(_, image)| image.inline()).collect();
        let skipped_sources: Vec<usize> = (1..=sources.len())
            .filter(|p| !submitted_positions.contains(p))
            .collect();

        if images.len() < MIN_SUPPORTING_SOURCES {
            return Err(ApiError::NonRetriable(format!(
                "Pattern classification needs at least {} images, {} could be fetched",
                MIN_SUPPORTING_SOURCES,
                images.len()
            )));
        }

        let prompt = classification_prompt(images.len(), note);
        let invocation = self
            .analysis
            .analyze(&prompt, &images, ANALYSIS_TEMPERATURE)
            .await?;

        let patterns = parse_patterns(&invocation.value, images.len())
            .into_iter()
            .map(|mut pattern| {
                pattern.source_indices = pattern
                    .source_indices
                    .iter()
                    .map(|&i| submitted_positions[i - 1])
                    .collect();
                pattern
            })
            .collect::<Vec<_>>();

        info!(
            sources = sources.len(),
            analyzed = images.len(),
            patterns = patterns.len(),
            model = %invocation.model,
            "Patterns classified"
        );
        Ok(Classification {
            patterns,
            model: invocation.model,
            skipped_sources,
        })
    }
}

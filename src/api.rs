//! Studio API
//!
//! Caller-facing surface over the generation layer. Every operation returns an
//! `ActionResponse` so callers can surface `error` and keep their prior state; nothing
//! here panics or discards earlier pipeline progress on failure.

use crate::adapter::Adapters;
use crate::artifact::{
    Artifact, ArtifactContent, ArtifactStore, ContentPath, InMemoryArtifactStore,
};
use crate::config::GenflowConfig;
use crate::error::ApiError;
use crate::gateway::{GeneratedOutput, InvocationResult};
use crate::pattern::{
    Classification, HttpReferenceFetcher, Pattern, PatternClassifier, ReferenceFetcher,
};
use crate::pipeline::{PipelineContext, StageExecutor, StageInput, StageKey, StageOutput, Workflow};
use crate::provider::{GeminiClient, GenerativeClient, InlineImage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Uniform `{success, data?, error?}` result shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ActionResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self.error.unwrap_or_else(|| "unknown error".to_string())),
        }
    }
}

impl<T> From<Result<T, ApiError>> for ActionResponse<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(data) => ActionResponse::ok(data),
            Err(err) => {
                warn!(error = %err, kind = ?err.kind(), "Action failed");
                ActionResponse::failure(err.to_string())
            }
        }
    }
}

/// Images generated for one pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternImages {
    pub pattern: String,
    /// Source URLs actually used as references
    pub references: Vec<String>,
    /// Data URIs of the variants that succeeded
    pub images: Vec<String>,
    /// Error messages of the variants that failed
    pub failures: Vec<String>,
}

/// Entry point wiring client, gateway, adapters and stores together
pub struct StudioApi {
    adapters: Adapters,
    executor: StageExecutor,
    classifier: PatternClassifier,
    artifacts: Arc<dyn ArtifactStore>,
    next_artifact: AtomicU64,
}

impl StudioApi {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        fetcher: Arc<dyn ReferenceFetcher>,
        artifacts: Arc<dyn ArtifactStore>,
        config: &GenflowConfig,
    ) -> Self {
        let adapters = Adapters::from_config(client, config);
        Self {
            executor: StageExecutor::new(adapters.clone()),
            classifier: PatternClassifier::new(adapters.analysis.clone(), fetcher),
            adapters,
            artifacts,
            next_artifact: AtomicU64::new(1),
        }
    }

    /// Build the production stack: Gemini client, HTTP fetcher, in-memory artifacts.
    pub fn from_config(config: &GenflowConfig) -> Result<Self, ApiError> {
        let client = Arc::new(GeminiClient::from_settings(&config.provider)?);
        let fetcher = Arc::new(HttpReferenceFetcher::new(&config.references)?);
        Ok(Self::new(
            client,
            fetcher,
            Arc::new(InMemoryArtifactStore::new()),
            config,
        ))
    }

    pub fn adapters(&self) -> &Adapters {
        &self.adapters
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.artifacts
    }

    pub async fn generate_text(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> ActionResponse<InvocationResult> {
        self.adapters
            .text
            .generate(prompt, temperature)
            .await
            .map(|inv| inv.map(GeneratedOutput::Text))
            .into()
    }

    pub async fn analyze_images(
        &self,
        prompt: &str,
        images: &[InlineImage],
        temperature: f32,
    ) -> ActionResponse<InvocationResult> {
        self.adapters
            .analysis
            .analyze(prompt, images, temperature)
            .await
            .map(|inv| inv.map(GeneratedOutput::Text))
            .into()
    }

    /// Synthesize one image, using whichever of `reference_urls` can be fetched.
    pub async fn synthesize_image(
        &self,
        prompt: &str,
        reference_urls: &[String],
    ) -> ActionResponse<InvocationResult> {
        let urls: Vec<&str> = reference_urls.iter().map(String::as_str).collect();
        let references: Vec<InlineImage> = self
            .classifier
            .mapper()
            .fetch_all(&urls)
            .await
            .iter()
            .map(|r| r.inline())
            .collect();
        self.adapters
            .synthesis
            .synthesize_inline(prompt, &references)
            .await
            .map(|inv| inv.map(GeneratedOutput::Image))
            .into()
    }

    /// Run one stage; on failure `ctx` keeps every earlier output.
    pub async fn run_stage<S: StageKey>(
        &self,
        workflow: &Workflow<S>,
        ctx: &mut PipelineContext<S>,
        key: S,
        input: &StageInput,
    ) -> ActionResponse<StageOutput> {
        self.executor
            .run_stage(workflow, ctx, key, input)
            .await
            .map(|output| output.clone())
            .into()
    }

    pub async fn classify_patterns(
        &self,
        sources: &[String],
        note: Option<&str>,
    ) -> ActionResponse<Classification> {
        self.classifier.classify(sources, note).await.into()
    }

    /// Generate `variants` images in the style of `pattern`, referencing its sources.
    pub async fn generate_from_pattern(
        &self,
        pattern: &Pattern,
        sources: &[String],
        prompt: &str,
        variants: usize,
    ) -> ActionResponse<PatternImages> {
        self.pattern_images(pattern, sources, prompt, variants)
            .await
            .into()
    }

    async fn pattern_images(
        &self,
        pattern: &Pattern,
        sources: &[String],
        prompt: &str,
        variants: usize,
    ) -> Result<PatternImages, ApiError> {
        let references = self
            .classifier
            .mapper()
            .references_for(pattern, sources)
            .await;
        let inline: Vec<InlineImage> = references.iter().map(|r| r.inline()).collect();
        let full_prompt = format!("{}\n\n{}", prompt, pattern.style_brief());

        let mut images = Vec::new();
        let mut failures = Vec::new();
        let mut last_error = None;
        for result in self
            .adapters
            .generate_variants(&full_prompt, &inline, variants.max(1))
            .await
        {
            match result {
                Ok(invocation) => images.push(invocation.value),
                Err(err) => {
                    failures.push(err.to_string());
                    last_error = Some(err);
                }
            }
        }
        if images.is_empty() {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        info!(
            pattern = %pattern.name,
            references = references.len(),
            generated = images.len(),
            failed = failures.len(),
            "Pattern images generated"
        );
        Ok(PatternImages {
            pattern: pattern.name.clone(),
            references: references.into_iter().map(|r| r.source_url).collect(),
            images,
            failures,
        })
    }

    pub fn save_artifact(&self, kind: &str, content: &ArtifactContent) -> ActionResponse<Artifact> {
        let sequence = self.next_artifact.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{}-{}", kind, Utc::now().format("%Y%m%d%H%M%S"), sequence);
        let artifact = Artifact::new(id, kind, content);
        self.artifacts
            .save(&artifact)
            .map(|_| artifact)
            .into()
    }

    pub fn edit_artifact(
        &self,
        id: &str,
        new_text: &str,
        path: ContentPath,
    ) -> ActionResponse<Artifact> {
        self.artifacts.update_text(id, new_text, path).into()
    }
}

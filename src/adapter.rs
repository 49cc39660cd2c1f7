//! Modality Adapters
//!
//! Text, multimodal-analysis and image-synthesis front ends over the shared
//! generative client. Each adapter builds its request and extracts its result; retry
//! and model fallback are delegated to the `InvocationGateway`.

use crate::config::GenflowConfig;
use crate::error::ApiError;
use crate::gateway::{Invocation, InvocationGateway};
use crate::provider::{GenerativeClient, InlineImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod analysis;
pub mod synthesis;
pub mod text;

pub use analysis::AnalysisAdapter;
pub use synthesis::{reference_preamble, SynthesisAdapter};
pub use text::TextAdapter;

/// Model cascades per modality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Default text model followed by its fallbacks
    #[serde(default = "default_text_models")]
    pub text: Vec<String>,

    /// Cascade for prompt-plus-images analysis
    #[serde(default = "default_text_models")]
    pub analysis: Vec<String>,

    /// Dedicated image-capable model; never cascaded
    #[serde(default = "default_image_model")]
    pub image: String,
}

fn default_text_models() -> Vec<String> {
    vec![
        "gemini-2.5-flash".to_string(),
        "gemini-2.0-flash".to_string(),
        "gemini-2.0-flash-lite".to_string(),
    ]
}

fn default_image_model() -> String {
    "gemini-2.5-flash-image-preview".to_string()
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            text: default_text_models(),
            analysis: default_text_models(),
            image: default_image_model(),
        }
    }
}

impl ModelCatalog {
    pub fn validate(&self) -> Result<(), String> {
        if self.text.is_empty() {
            return Err("Text cascade cannot be empty".to_string());
        }
        if self.analysis.is_empty() {
            return Err("Analysis cascade cannot be empty".to_string());
        }
        if self.image.trim().is_empty() {
            return Err("Image model cannot be empty".to_string());
        }
        if let Some(blank) = self
            .text
            .iter()
            .chain(self.analysis.iter())
            .find(|m| m.trim().is_empty())
        {
            return Err(format!("Model identifier cannot be blank: {:?}", blank));
        }
        Ok(())
    }
}

/// The three adapters sharing one client and one gateway
#[derive(Clone)]
pub struct Adapters {
    pub text: TextAdapter,
    pub analysis: AnalysisAdapter,
    pub synthesis: SynthesisAdapter,
}

impl Adapters {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        gateway: InvocationGateway,
        models: &ModelCatalog,
        synthesis_timeout: Duration,
    ) -> Self {
        Self {
            text: TextAdapter::new(client.clone(), gateway.clone(), models.text.clone()),
            analysis: AnalysisAdapter::new(
                client.clone(),
                gateway.clone(),
                models.analysis.clone(),
            ),
            synthesis: SynthesisAdapter::new(
                client,
                gateway,
                models.image.clone(),
                synthesis_timeout,
            ),
        }
    }

    pub fn from_config(client: Arc<dyn GenerativeClient>, config: &GenflowConfig) -> Self {
        let gateway = InvocationGateway::new(config.gateway.retry_policy())
            .with_attempt_timeout(config.gateway.attempt_timeout());
        Self::new(
            client,
            gateway,
            &config.models,
            config.synthesis.timeout(),
        )
    }

    /// Fan out `count` independent image syntheses; each result stands alone.
    pub async fn generate_variants(
        &self,
        prompt: &str,
        references: &[InlineImage],
        count: usize,
    ) -> Vec<Result<Invocation<String>, ApiError>> {
        self.synthesis
            .synthesize_variants(prompt, references, count)
            .await
    }
}

//! Shared test utilities for integration tests
//!
//! Scripted stand-ins for the generative service and the reference fetcher, so the
//! whole stack can be driven without network access.

use async_trait::async_trait;
use genflow::config::GenflowConfig;
use genflow::error::ApiError;
use genflow::pattern::{ReferenceFetcher, ReferenceImage};
use genflow::provider::{
    GenerationOptions, GenerativeClient, InlineImage, ProviderResponse, ResponsePart,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

type Outcome = Box<dyn Fn() -> Result<ProviderResponse, ApiError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub model: String,
    pub prompt: String,
    pub images: usize,
}

/// Generative client answering from per-model scripts.
///
/// Queued outcomes are consumed first; a model with an empty queue falls back to its
/// `always` outcome, or reports itself as not found.
#[derive(Default)]
pub struct ScriptedClient {
    queued: Mutex<HashMap<String, VecDeque<Outcome>>>,
    fallback: Mutex<HashMap<String, Outcome>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then<F>(&self, model: &str, outcome: F) -> &Self
    where
        F: Fn() -> Result<ProviderResponse, ApiError> + Send + Sync + 'static,
    {
        self.queued
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(Box::new(outcome));
        self
    }

    pub fn then_text(&self, model: &str, text: &str) -> &Self {
        let model_name = model.to_string();
        let text = text.to_string();
        self.then(model, move || Ok(ProviderResponse::text(model_name.clone(), text.clone())))
    }

    pub fn always<F>(&self, model: &str, outcome: F) -> &Self
    where
        F: Fn() -> Result<ProviderResponse, ApiError> + Send + Sync + 'static,
    {
        self.fallback
            .lock()
            .unwrap()
            .insert(model.to_string(), Box::new(outcome));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str) -> usize {
        self.calls().iter().filter(|c| c.model == model).count()
    }

    fn answer(
        &self,
        model: &str,
        prompt: &str,
        images: usize,
    ) -> Result<ProviderResponse, ApiError> {
        self.calls.lock().unwrap().push(Call {
            model: model.to_string(),
            prompt: prompt.to_string(),
            images,
        });
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(VecDeque::pop_front);
        if let Some(outcome) = queued {
            return outcome();
        }
        match self.fallback.lock().unwrap().get(model) {
            Some(outcome) => outcome(),
            None => Err(ApiError::Provider(format!(
                "404 models/{} is not found for API version v1beta",
                model
            ))),
        }
    }
}

#[async_trait]
impl GenerativeClient for ScriptedClient {
    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError> {
        self.answer(model, prompt, 0)
    }

    async fn generate_from_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[InlineImage],
        _options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError> {
        self.answer(model, prompt, images.len())
    }

    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<ProviderResponse, ApiError> {
        self.answer(model, prompt, references.len())
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

pub fn image_response(model: &str, data: &str) -> ProviderResponse {
    ProviderResponse {
        model: model.to_string(),
        parts: vec![ResponsePart::InlineImage(InlineImage {
            mime_type: "image/png".to_string(),
            data: data.to_string(),
        })],
    }
}

/// Fetcher serving a fixed set of URLs; anything else fails.
#[derive(Default)]
pub struct MapFetcher {
    images: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn serving(urls: &[&str]) -> Self {
        Self {
            images: urls
                .iter()
                .map(|u| (u.to_string(), format!("bytes-of-{}", u)))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn requested(&self) -> Vec<String> {
        let mut requested = self.requested.lock().unwrap().clone();
        requested.sort();
        requested
    }
}

#[async_trait]
impl ReferenceFetcher for MapFetcher {
    async fn fetch(&self, url: &str) -> Result<ReferenceImage, ApiError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.images.get(url) {
            Some(data) => Ok(ReferenceImage {
                mime_type: "image/png".to_string(),
                data: data.clone(),
                source_url: url.to_string(),
            }),
            None => Err(ApiError::ReferenceFetch {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
            }),
        }
    }
}

/// Config with short, named cascades for tests.
pub fn test_config() -> GenflowConfig {
    let mut config = GenflowConfig::default();
    config.models.text = vec!["m1".to_string(), "m2".to_string()];
    config.models.analysis = vec!["vision".to_string()];
    config.models.image = "painter".to_string();
    config
}

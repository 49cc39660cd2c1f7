//! Generative Service Client
//!
//! Boundary to the external generative service. Exposes the three logical operations
//! every content tool needs (text, text-from-images, image) behind one trait so the
//! gateway and adapters can be exercised against scripted clients. The HTTP client is
//! constructed once and shared through `Arc<dyn GenerativeClient>`.

use crate::error::ApiError;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Binary image carried inline as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    pub mime_type: String,
    /// Base64 payload (standard alphabet, padded)
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Parse a `data:{mime};base64,{payload}` URI.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.trim().strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime_type = meta.strip_suffix(";base64")?;
        if payload.is_empty() {
            return None;
        }
        Some(Self {
            mime_type: if mime_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime_type.to_string()
            },
            data: payload.to_string(),
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>, ApiError> {
        BASE64
            .decode(self.data.as_bytes())
            .map_err(|e| ApiError::ParseFailure(format!("Invalid base64 image payload: {}", e)))
    }
}

/// One part of a model response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePart {
    Text(String),
    InlineImage(InlineImage),
}

/// Response from a single generative call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub model: String,
    pub parts: Vec<ResponsePart>,
}

impl ProviderResponse {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parts: vec![ResponsePart::Text(text.into())],
        }
    }

    /// Concatenated text of all text parts
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                ResponsePart::Text(text) => Some(text.as_str()),
                ResponsePart::InlineImage(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn first_image(&self) -> Option<&InlineImage> {
        self.parts.iter().find_map(|part| match part {
            ResponsePart::InlineImage(image) => Some(image),
            ResponsePart::Text(_) => None,
        })
    }
}

/// Sampling options forwarded to the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            max_output_tokens: None,
        }
    }
}

/// Generative service client trait
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Generate text from a single prompt
    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError>;

    /// Generate text from a prompt plus inline images
    async fn generate_from_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[InlineImage],
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError>;

    /// Request an image-capable response, optionally steered by reference images
    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<ProviderResponse, ApiError>;

    fn provider_name(&self) -> &str;
}

/// Provider endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Literal API key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!("base_url must be an http(s) URL: {}", self.base_url));
        }
        if self.api_key.is_none() && self.api_key_env.trim().is_empty() {
            return Err("Either api_key or api_key_env must be set".to_string());
        }
        Ok(())
    }

    pub fn resolve_api_key(&self) -> Result<String, ApiError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ApiError::ConfigError(format!(
                    "API key not configured (set provider.api_key or {})",
                    self.api_key_env
                ))
            })
    }
}

// generateContent request/response structures
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        alias = "inline_data"
    )]
    inline_data: Option<Blob>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        inline_data: None,
    }
}

fn image_part(image: &InlineImage) -> Part {
    Part {
        text: None,
        inline_data: Some(Blob {
            mime_type: image.mime_type.clone(),
            data: image.data.clone(),
        }),
    }
}

/// Map a non-success HTTP status plus body onto the error taxonomy.
///
/// Statuses without a fixed meaning keep their body text in `ApiError::Provider`
/// so the gateway can still classify them by signature.
pub fn map_status_error(status: u16, body: &str) -> ApiError {
    match status {
        429 => ApiError::Transient(format!("429 rate limit or quota exceeded: {}", body)),
        500 | 502 | 503 | 504 => {
            ApiError::Transient(format!("{} server overloaded: {}", status, body))
        }
        404 => ApiError::ModelUnavailable(format!("404 model not found: {}", body)),
        _ => ApiError::Provider(format!("{}: {}", status, body)),
    }
}

fn map_http_error(error: reqwest::Error) -> ApiError {
    if let Some(status) = error.status() {
        map_status_error(status.as_u16(), &error.to_string())
    } else if error.is_timeout() {
        ApiError::Provider(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        ApiError::Provider(format!("Connection error: {}", error))
    } else {
        ApiError::Provider(format!("HTTP error: {}", error))
    }
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(settings: &ProviderSettings, api_key: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build the client from settings, resolving the API key from config or environment.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, ApiError> {
        let api_key = settings.resolve_api_key()?;
        Self::new(settings, api_key)
    }

    async fn generate_content(
        &self,
        model: &str,
        request: GenerateContentRequest,
    ) -> Result<ProviderResponse, ApiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status_error(status, &error_text));
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Provider(format!("Failed to parse response: {}", e)))?;

        Ok(ProviderResponse {
            model: model.to_string(),
            parts: collect_parts(body),
        })
    }
}

fn collect_parts(body: GenerateContentResponse) -> Vec<ResponsePart> {
    body.candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| match (part.inline_data, part.text) {
            (Some(blob), _) if !blob.data.is_empty() => {
                Some(ResponsePart::InlineImage(InlineImage {
                    mime_type: blob.mime_type,
                    data: blob.data,
                }))
            }
            (_, Some(text)) => Some(ResponsePart::Text(text)),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError> {
        self.generate_from_images(model, prompt, &[], options).await
    }

    async fn generate_from_images(
        &self,
        model: &str,
        prompt: &str,
        images: &[InlineImage],
        options: &GenerationOptions,
    ) -> Result<ProviderResponse, ApiError> {
        let mut parts = vec![text_part(prompt)];
        parts.extend(images.iter().map(image_part));
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_output_tokens,
                response_modalities: None,
            }),
        };
        self.generate_content(model, request).await
    }

    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<ProviderResponse, ApiError> {
        // References first so the prompt reads as instructions about them
        let mut parts: Vec<Part> = references.iter().map(image_part).collect();
        parts.push(text_part(prompt));
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: Some(GenerationConfig {
                temperature: None,
                max_output_tokens: None,
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            }),
        };
        self.generate_content(model, request).await
    }

    fn provider_name(&self) -> &str {
        "gemini"
    }
}

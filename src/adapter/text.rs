//! Text adapter: one prompt in, raw text out.

use crate::error::ApiError;
use crate::gateway::{Invocation, InvocationGateway, InvocationRequest};
use crate::provider::{GenerationOptions, GenerativeClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct TextAdapter {
    client: Arc<dyn GenerativeClient>,
    gateway: InvocationGateway,
    cascade: Vec<String>,
}

impl TextAdapter {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        gateway: InvocationGateway,
        cascade: Vec<String>,
    ) -> Self {
        Self {
            client,
            gateway,
            cascade,
        }
    }

    pub fn cascade(&self) -> &[String] {
        &self.cascade
    }

    /// Build a request against this adapter's cascade.
    pub fn request(&self, prompt: impl Into<String>, temperature: f32) -> InvocationRequest {
        InvocationRequest::new(prompt, temperature, self.cascade.clone())
    }

    pub async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<Invocation<String>, ApiError> {
        self.execute(&self.request(prompt, temperature)).await
    }

    /// Run an explicit request (custom cascade or attempt timeout).
    pub async fn execute(
        &self,
        request: &InvocationRequest,
    ) -> Result<Invocation<String>, ApiError> {
        let options = GenerationOptions::with_temperature(request.temperature);
        let client = &self.client;
        let prompt = request.prompt.as_str();
        let options = &options;
        self.gateway
            .invoke(request, |model| async move {
                let response = client.generate_text(&model, prompt, options).await?;
                Ok(response.joined_text())
            })
            .await
    }
}

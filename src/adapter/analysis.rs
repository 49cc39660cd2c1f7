//! Multimodal analysis adapter: prompt plus images in, raw text (usually JSON) out.

use crate::error::ApiError;
use crate::gateway::{Invocation, InvocationGateway, InvocationRequest};
use crate::provider::{GenerationOptions, GenerativeClient, InlineImage};
use std::sync::Arc;

#[derive(Clone)]
pub struct AnalysisAdapter {
    client: Arc<dyn GenerativeClient>,
    gateway: InvocationGateway,
    cascade: Vec<String>,
}

impl AnalysisAdapter {
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

    pub async fn analyze(
        &self,
        prompt: &str,
        images: &[InlineImage],
        temperature: f32,
    ) -> Result<Invocation<String>, ApiError> {
        let request = InvocationRequest::new(prompt, temperature, self.cascade.clone());
        let options = GenerationOptions::with_temperature(temperature);
        let client = &self.client;
        let options = &options;
        self.gateway
            .invoke(&request, |model| async move {
                let response = client
                    .generate_from_images(&model, prompt, images, options)
                    .await?;
                Ok(response.joined_text())
            })
            .await
    }
}

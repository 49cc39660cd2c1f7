//! Image synthesis adapter
//!
//! Requests an image response from the single dedicated image model. The whole gateway
//! call is raced against a hard timeout, and the first inline image part is returned as
//! a data URI. When reference images are supplied, fidelity instructions are placed
//! ahead of the task prompt.

use crate::error::ApiError;
use crate::gateway::{Invocation, InvocationGateway};
use crate::provider::{GenerativeClient, InlineImage};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Fidelity instructions injected before the task prompt when references are present.
pub fn reference_preamble(reference_count: usize) -> String {
    let subject = if reference_count == 1 {
        "the attached reference image".to_string()
    } else {
        format!("the {} attached reference images", reference_count)
    };
    format!(
        "Use {subject} as the visual source of truth.\n\
         - Match their visual style: color palette, lighting, rendering technique and typography treatment.\n\
         - Keep their layout and composition: element placement, hierarchy and whitespace.\n\
         - Preserve the identity of any people, characters, products or logos shown; do not redesign them.\n\
         - Do not introduce styles that are not present in the references.\n\n\
         Task:\n"
    )
}

/// Final prompt sent to the image model.
pub fn compose_prompt(prompt: &str, reference_count: usize) -> String {
    if reference_count == 0 {
        prompt.to_string()
    } else {
        format!("{}{}", reference_preamble(reference_count), prompt)
    }
}

#[derive(Clone)]
pub struct SynthesisAdapter {
    client: Arc<dyn GenerativeClient>,
    gateway: InvocationGateway,
    model: String,
    timeout: Duration,
}

impl SynthesisAdapter {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        gateway: InvocationGateway,
        model: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            gateway,
            model,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate one image; returns a `data:{mime};base64,...` URI.
    pub async fn synthesize(
        &self,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<Invocation<String>, ApiError> {
        let invocation = self.synthesize_inline(prompt, references).await?;
        Ok(invocation.map(|image| image.to_data_uri()))
    }

    /// Generate one image and return it as an inline payload.
    pub async fn synthesize_inline(
        &self,
        prompt: &str,
        references: &[InlineImage],
    ) -> Result<Invocation<InlineImage>, ApiError> {
        let full_prompt = compose_prompt(prompt, references.len());
        let cascade = [self.model.clone()];
        let client = &self.client;
        let full_prompt = full_prompt.as_str();

        let call = self.gateway.invoke_cascade(&cascade, |model| async move {
            let response = client.generate_image(&model, full_prompt, references).await?;
            response
                .first_image()
                .cloned()
                .ok_or(ApiError::NoImageGenerated(model))
        });

        match timeout(self.timeout, call).await {
            Ok(result) => {
                let invocation = result?;
                info!(
                    model = %invocation.model,
                    references = references.len(),
                    "Image synthesized"
                );
                Ok(invocation)
            }
            Err(_) => {
                warn!(
                    model = %self.model,
                    timeout_secs = self.timeout.as_secs(),
                    "Image synthesis timed out"
                );
                Err(ApiError::Timeout(self.timeout))
            }
        }
    }

    /// Generate `count` independent variants concurrently; one failure does not cancel the rest.
    pub async fn synthesize_variants(
        &self,
        prompt: &str,
        references: &[InlineImage],
        count: usize,
    ) -> Vec<Result<Invocation<String>, ApiError>> {
        join_all((0..count).map(|_| self.synthesize(prompt, references))).await
    }
}

//! Stage executor: runs exactly one stage per call.
//! Owns prompt building, adapter dispatch and response interpretation; retry and
//! fallback stay in the gateway.

use super::context::{PipelineContext, StageKey, StageOutput};
use super::stage::{Modality, ResponseFormat, StageDefinition, StageInput, Workflow};
use crate::adapter::Adapters;
use crate::error::ApiError;
use crate::gateway::Invocation;
use crate::parse;
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, warn};

/// Executes single workflow stages against the modality adapters.
#[derive(Clone)]
pub struct StageExecutor {
    adapters: Adapters,
}

impl StageExecutor {
    pub fn new(adapters: Adapters) -> Self {
        Self { adapters }
    }

    /// Compute a stage's output from the current context and new input.
    ///
    /// The context is only read; callers decide whether to record the result.
    pub async fn execute_stage<S: StageKey>(
        &self,
        workflow: &Workflow<S>,
        ctx: &PipelineContext<S>,
        key: S,
        input: &StageInput,
    ) -> Result<StageOutput, ApiError> {
        let definition = workflow.stage(key)?;
        if let Some(missing) = workflow.missing_prerequisite(ctx, key)? {
            return Err(ApiError::StageNotReady {
                stage: key.name().to_string(),
                missing: missing.name().to_string(),
            });
        }

        let prompt = (definition.build_prompt)(ctx, input)?;
        let first = self.call(definition, &prompt, input).await?;
        let model = first.model.clone();
        let first_attempts = first.attempts;

        let (raw, parsed, attempts) = match &definition.format {
            ResponseFormat::Text => (first.value, None, first_attempts),
            ResponseFormat::Json { default } => {
                let parsed = parse::parse_or_default::<Value>(&first.value, default.clone());
                (first.value, Some(parsed), first_attempts)
            }
            ResponseFormat::StrictJson { max_extra_attempts } => {
                let extra_attempts = AtomicU32::new(0);
                let repaired = parse::parse_with_retry::<Value, _, _>(
                    first.value,
                    *max_extra_attempts,
                    || {
                        let extra_attempts = &extra_attempts;
                        let prompt = prompt.as_str();
                        async move {
                            let again = self.call(definition, prompt, input).await?;
                            extra_attempts.fetch_add(again.attempts, Ordering::Relaxed);
                            Ok(again.value)
                        }
                    },
                )
                .await?;
                if repaired.regenerations > 0 {
                    warn!(
                        stage = key.name(),
                        regenerations = repaired.regenerations,
                        "Stage output needed regeneration to parse"
                    );
                }
                (
                    repaired.raw,
                    Some(repaired.value),
                    first_attempts + extra_attempts.load(Ordering::Relaxed),
                )
            }
        };

        Ok(StageOutput {
            raw,
            parsed,
            input: input.text.clone(),
            model: Some(model),
            attempts,
            revision: 0,
            completed_at: Utc::now(),
        })
    }

    /// Execute a stage and record its output in the context.
    ///
    /// On failure the context is left exactly as it was.
    pub async fn run_stage<'c, S: StageKey>(
        &self,
        workflow: &Workflow<S>,
        ctx: &'c mut PipelineContext<S>,
        key: S,
        input: &StageInput,
    ) -> Result<&'c StageOutput, ApiError> {
        let output = self.execute_stage(workflow, ctx, key, input).await?;
        let recorded = ctx.record(key, output);
        info!(
            workflow = workflow.name,
            stage = key.name(),
            model = recorded.model.as_deref().unwrap_or_default(),
            attempts = recorded.attempts,
            revision = recorded.revision,
            "Stage completed"
        );
        Ok(recorded)
    }

    async fn call<S: StageKey>(
        &self,
        definition: &StageDefinition<S>,
        prompt: &str,
        input: &StageInput,
    ) -> Result<Invocation<String>, ApiError> {
        match definition.modality {
            Modality::Text => {
                self.adapters
                    .text
                    .generate(prompt, definition.temperature)
                    .await
            }
            Modality::Analysis => {
                self.adapters
                    .analysis
                    .analyze(prompt, &input.images, definition.temperature)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ModelCatalog;
    use crate::gateway::InvocationGateway;
    use crate::provider::mock::MockClient;
    use crate::provider::ProviderResponse;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    enum Step {
        Outline,
        Draft,
    }

    impl StageKey for Step {
        fn name(&self) -> &'static str {
            match self {
                Step::Outline => "outline",
                Step::Draft => "draft",
            }
        }
    }

    fn outline_prompt(
        _ctx: &PipelineContext<Step>,
        input: &StageInput,
    ) -> Result<String, ApiError> {
        Ok(format!("Outline: {}", input.note().unwrap_or("")))
    }

    fn draft_prompt(ctx: &PipelineContext<Step>, _input: &StageInput) -> Result<String, ApiError> {
        let outline = ctx.require_text(Step::Draft, Step::Outline)?;
        Ok(format!("Draft from: {}", outline))
    }

    fn workflow(format: ResponseFormat) -> Workflow<Step> {
        Workflow::new(
            "test",
            vec![
                StageDefinition {
                    key: Step::Outline,
                    requires: &[],
                    modality: Modality::Text,
                    format,
                    temperature: 0.2,
                    build_prompt: outline_prompt,
                },
                StageDefinition {
                    key: Step::Draft,
                    requires: &[Step::Outline],
                    modality: Modality::Text,
                    format: ResponseFormat::Text,
                    temperature: 0.7,
                    build_prompt: draft_prompt,
                },
            ],
        )
    }

    fn executor(client: Arc<MockClient>) -> StageExecutor {
        let models = ModelCatalog {
            text: vec!["m".to_string()],
            analysis: vec!["m".to_string()],
            image: "img".to_string(),
        };
        StageExecutor::new(Adapters::new(
            client,
            InvocationGateway::default(),
            &models,
            Duration::from_secs(60),
        ))
    }

    #[tokio::test]
    async fn later_stage_reads_earlier_output() {
        let client = Arc::new(MockClient::new());
        client
            .push("m", || Ok(ProviderResponse::text("m", "{\"points\": [\"a\"]}")))
            .push("m", || Ok(ProviderResponse::text("m", "The draft")));
        let executor = executor(client.clone());
        let wf = workflow(ResponseFormat::Json {
            default: json!({"points": []}),
        });
        let mut ctx = PipelineContext::new(wf.name);

        executor
            .run_stage(&wf, &mut ctx, Step::Outline, &StageInput::text("topic"))
            .await
            .unwrap();
        assert_eq!(ctx.parsed(Step::Outline), Some(&json!({"points": ["a"]})));
        assert_eq!(wf.next_pending(&ctx), Some(Step::Draft));

        let draft = executor
            .run_stage(&wf, &mut ctx, Step::Draft, &StageInput::none())
            .await
            .unwrap();
        assert_eq!(draft.raw, "The draft");
        assert_eq!(
            client.calls.lock()[1].prompt,
            "Draft from: {\"points\": [\"a\"]}"
        );
    }

    #[tokio::test]
    async fn stage_with_missing_prerequisite_is_rejected_without_calling() {
        let client = Arc::new(MockClient::new());
        let executor = executor(client.clone());
        let wf = workflow(ResponseFormat::Text);
        let mut ctx = PipelineContext::new(wf.name);

        let err = executor
            .run_stage(&wf, &mut ctx, Step::Draft, &StageInput::none())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::StageNotReady { .. }));
        assert!(client.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn json_default_substitutes_unparseable_output() {
        let client = Arc::new(MockClient::new());
        client.push("m", || Ok(ProviderResponse::text("m", "sorry, no json")));
        let executor = executor(client);
        let wf = workflow(ResponseFormat::Json {
            default: json!({"points": []}),
        });
        let mut ctx = PipelineContext::new(wf.name);
        let output = executor
            .run_stage(&wf, &mut ctx, Step::Outline, &StageInput::text("t"))
            .await
            .unwrap();
        assert_eq!(output.raw, "sorry, no json");
        assert_eq!(output.parsed, Some(json!({"points": []})));
    }

    #[tokio::test]
    async fn strict_json_regenerates_and_counts_attempts() {
        let client = Arc::new(MockClient::new());
        client
            .push("m", || Ok(ProviderResponse::text("m", "nope")))
            .push("m", || Ok(ProviderResponse::text("m", "```json\n{\"ok\": true}\n```")));
        let executor = executor(client);
        let wf = workflow(ResponseFormat::StrictJson {
            max_extra_attempts: 2,
        });
        let mut ctx = PipelineContext::new(wf.name);
        let output = executor
            .run_stage(&wf, &mut ctx, Step::Outline, &StageInput::text("t"))
            .await
            .unwrap();
        assert_eq!(output.parsed, Some(json!({"ok": true})));
        assert_eq!(output.attempts, 2);
    }

    #[tokio::test]
    async fn failed_rerun_keeps_previous_output() {
        let client = Arc::new(MockClient::new());
        client
            .push("m", || Ok(ProviderResponse::text("m", "first outline")))
            .push("m", || Err(ApiError::NonRetriable("400 bad request".to_string())));
        let executor = executor(client);
        let wf = workflow(ResponseFormat::Text);
        let mut ctx = PipelineContext::new(wf.name);

        executor
            .run_stage(&wf, &mut ctx, Step::Outline, &StageInput::text("t"))
            .await
            .unwrap();
        let err = executor
            .run_stage(&wf, &mut ctx, Step::Outline, &StageInput::text("t"))
            .await;
        assert!(err.is_err());
        assert_eq!(ctx.text(Step::Outline), Some("first outline"));
        assert_eq!(ctx.history().len(), 1);
    }
}

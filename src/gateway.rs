//! Invocation Gateway
//!
//! Executes one logical generative call against an ordered model cascade. Each model
//! gets up to `max_attempts_per_model` attempts; transient failures back off
//! exponentially and retry the same model, model-unavailable failures move straight to
//! the next model, and any other failure is returned immediately. The gateway keeps no
//! state between invocations.

use crate::error::{ApiError, ErrorKind};
use crate::provider::InlineImage;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Per-model retry and backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts_per_model: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts_per_model: 3,
            base_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay after a transient failure on `attempt` (1-indexed): `base * 2^(attempt-1)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(1u32 << exponent)
    }

    /// Upper bound on attempts for a cascade of `models` entries.
    pub fn max_total_attempts(&self, models: usize) -> usize {
        models * self.max_attempts_per_model as usize
    }
}

/// One logical call: prompt, sampling temperature, cascade and per-attempt timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub cascade: Vec<String>,
    #[serde(default)]
    pub attempt_timeout: Option<Duration>,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, cascade: Vec<String>) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            cascade,
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }
}

/// Generated payload: text or one inline image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneratedOutput {
    Text(String),
    Image(InlineImage),
}

/// Successful invocation: the value, the model that produced it and the total attempts made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation<T> {
    pub value: T,
    pub model: String,
    pub attempts: u32,
}

impl<T> Invocation<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Invocation<U> {
        Invocation {
            value: f(self.value),
            model: self.model,
            attempts: self.attempts,
        }
    }
}

pub type InvocationResult = Invocation<GeneratedOutput>;

/// Cascading, retrying executor for generative calls
#[derive(Debug, Clone, Default)]
pub struct InvocationGateway {
    policy: RetryPolicy,
    attempt_timeout: Option<Duration>,
}

impl InvocationGateway {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt_timeout: None,
        }
    }

    /// Default per-attempt timeout for requests that do not set their own.
    pub fn with_attempt_timeout(mut self, attempt_timeout: Option<Duration>) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` for the request's cascade, honouring its per-attempt timeout.
    pub async fn invoke<T, F, Fut>(
        &self,
        request: &InvocationRequest,
        operation: F,
    ) -> Result<Invocation<T>, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let attempt_timeout = request.attempt_timeout.or(self.attempt_timeout);
        self.run_cascade(&request.cascade, attempt_timeout, operation)
            .await
    }

    /// Run `operation` against each model of `cascade` in order.
    pub async fn invoke_cascade<T, F, Fut>(
        &self,
        cascade: &[String],
        operation: F,
    ) -> Result<Invocation<T>, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.run_cascade(cascade, self.attempt_timeout, operation)
            .await
    }

    async fn run_cascade<T, F, Fut>(
        &self,
        cascade: &[String],
        attempt_timeout: Option<Duration>,
        mut operation: F,
    ) -> Result<Invocation<T>, ApiError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if cascade.is_empty() {
            return Err(ApiError::EmptyCascade);
        }

        let mut total_attempts = 0u32;
        let mut last_error: Option<ApiError> = None;

        for (model_index, model) in cascade.iter().enumerate() {
            for attempt in 1..=self.policy.max_attempts_per_model {
                total_attempts += 1;
                debug!(model = %model, attempt, "Invoking model");

                let call = operation(model.clone());
                let outcome = match attempt_timeout {
                    Some(limit) => match timeout(limit, call).await {
                        Ok(result) => result,
                        Err(_) => Err(ApiError::Timeout(limit)),
                    },
                    None => call.await,
                };

                let err = match outcome {
                    Ok(value) => {
                        if model_index > 0 || attempt > 1 {
                            info!(
                                model = %model,
                                attempts = total_attempts,
                                "Invocation succeeded after retry or fallback"
                            );
                        }
                        return Ok(Invocation {
                            value,
                            model: model.clone(),
                            attempts: total_attempts,
                        });
                    }
                    Err(err) => err,
                };

                match err.kind() {
                    ErrorKind::Transient => {
                        let delay = self.policy.delay_for_attempt(attempt);
                        warn!(
                            model = %model,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient failure, backing off"
                        );
                        sleep(delay).await;
                        last_error = Some(err);
                    }
                    ErrorKind::ModelUnavailable => {
                        warn!(
                            model = %model,
                            error = %err,
                            "Model unavailable, moving to next model in cascade"
                        );
                        last_error = Some(err);
                        break;
                    }
                    ErrorKind::NonRetriable | ErrorKind::ParseFailure => {
                        warn!(model = %model, error = %err, "Non-retriable failure");
                        return Err(err);
                    }
                }
            }
        }

        warn!(
            cascade = ?cascade,
            attempts = total_attempts,
            "Model cascade exhausted"
        );
        Err(last_error.unwrap_or(ApiError::EmptyCascade))
    }
}

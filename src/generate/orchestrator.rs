//! Ordered model fallback.
//!
//! Each model in the list is tried once, in order. The first successful
//! completion is normalized and returned. When the list is exhausted the
//! caller receives the mock payload instead of an error: an unavailable AI
//! service degrades the result, it never fails the request.

use super::GenerateError;
use super::mock::mock_payload;
use super::normalize::normalize;
use super::prompt::{system_prompt, user_prompt};
use super::types::{ComponentState, Generated, GeneratedPayload, GenerationContext, GenerationSource};
use crate::error::ValidationError;
use crate::provider::{CompletionProvider, CompletionRequest, failure_category};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound for `generate_variations`.
pub const MAX_VARIATIONS: usize = 5;

/// One failed model attempt.
#[derive(Debug, Clone)]
struct ModelFailure {
    model: String,
    error: String,
}

/// Terminal state of the fallback loop.
#[derive(Debug)]
enum Attempts {
    Succeeded(Generated),
    Exhausted(Vec<ModelFailure>),
}

/// One entry of a variations response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variation {
    pub id: String,
    #[serde(flatten)]
    pub payload: GeneratedPayload,
    #[serde(skip)]
    pub source: GenerationSource,
}

pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    models: Vec<String>,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, models: Vec<String>) -> Self {
        Self { provider, models }
    }

    /// Generate a component. Only cancellation or an empty prompt produce an
    /// error; provider failures end in the mock payload.
    pub async fn generate(
        &self,
        prompt: &str,
        ctx: &GenerationContext,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        validate_prompt(prompt)?;

        let system = system_prompt(ctx);
        let user = user_prompt(prompt, ctx);

        match self.try_models(&system, &user, cancel).await? {
            Attempts::Succeeded(generated) => Ok(generated),
            Attempts::Exhausted(failures) => {
                let tried: Vec<&str> = failures.iter().map(|f| f.model.as_str()).collect();
                warn!(
                    models = ?tried,
                    last_error = failures.last().map_or("no models configured", |f| f.error.as_str()),
                    "All models failed, returning mock component"
                );
                Ok(Generated {
                    payload: mock_payload(prompt),
                    source: GenerationSource::Mock,
                })
            }
        }
    }

    /// Modify `original` according to `prompt`. Same as [`Self::generate`]
    /// in iteration mode.
    pub async fn refine(
        &self,
        prompt: &str,
        original: ComponentState,
        ctx: &GenerationContext,
        cancel: &CancellationToken,
    ) -> Result<Generated, GenerateError> {
        self.generate(prompt, &ctx.iterating_on(original), cancel).await
    }

    /// `count` independent generations, run one after another. No attempt is
    /// made to make them differ beyond the prompt suffix.
    pub async fn generate_variations(
        &self,
        prompt: &str,
        count: usize,
        ctx: &GenerationContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Variation>, GenerateError> {
        validate_variations(prompt, count)?;

        let mut variations = Vec::with_capacity(count);
        for n in 1..=count {
            let varied = format!("{prompt} (Variation {n})");
            let generated = self.generate(&varied, ctx, cancel).await?;
            variations.push(Variation {
                id: format!("variation-{n}"),
                payload: generated.payload,
                source: generated.source,
            });
        }
        Ok(variations)
    }

    async fn try_models(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<Attempts, GenerateError> {
        let mut failures = Vec::new();

        for model in &self.models {
            if cancel.is_cancelled() {
                return Err(GenerateError::Cancelled);
            }

            let request = CompletionRequest::new(model.clone(), system, user);
            debug!(model = %model, "Trying model");

            let result = tokio::select! {
                () = cancel.cancelled() => return Err(GenerateError::Cancelled),
                result = self.provider.complete(request) => result,
            };

            match result {
                Ok(text) => {
                    info!(model = %model, response_chars = text.len(), "Model succeeded");
                    return Ok(Attempts::Succeeded(Generated {
                        payload: normalize(&text),
                        source: GenerationSource::Model(model.clone()),
                    }));
                }
                Err(e) => {
                    let error = e.to_string();
                    warn!(
                        model = %model,
                        category = failure_category(&error).unwrap_or("Permanent"),
                        error = %error,
                        "Model failed, trying next"
                    );
                    failures.push(ModelFailure {
                        model: model.clone(),
                        error,
                    });
                }
            }
        }

        Ok(Attempts::Exhausted(failures))
    }
}

fn validate_prompt(prompt: &str) -> Result<(), GenerateError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::field("prompt", "must not be empty").into());
    }
    Ok(())
}

fn validate_variations(prompt: &str, count: usize) -> Result<(), GenerateError> {
    let mut err = ValidationError::new();
    if prompt.trim().is_empty() {
        err.push("prompt", "must not be empty");
    }
    if count == 0 || count > MAX_VARIATIONS {
        err.push("count", format!("must be between 1 and {MAX_VARIATIONS}"));
    }
    err.into_result().map_err(GenerateError::from)
}

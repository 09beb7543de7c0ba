//! Shared types for completion providers.

use super::error::Error;
use async_trait::async_trait;

/// One text completion: a system prompt and a single user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// Model identifier, optionally prefixed with a provider id
    /// (`anthropic/claude-3-5-haiku-latest`).
    pub model: String,
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Anything that can turn a prompt pair into raw model text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, Error>;
}

/// Default output budget for component generation.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

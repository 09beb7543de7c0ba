//! Routes `provider/model` identifiers to configured backends.

use super::anthropic::AnthropicClient;
use super::api_provider::Provider;
use super::error::Error;
use super::openai_compat::OpenAICompatClient;
use super::types::{CompletionProvider, CompletionRequest};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Credentials and endpoint overrides for one backend.
#[derive(Clone, Default)]
pub struct BackendSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl std::fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Multi-backend completion client.
///
/// A model whose backend has no credentials fails with `MissingApiKey`, which
/// the orchestrator treats like any other failed attempt.
#[derive(Default)]
pub struct Client {
    backends: HashMap<Provider, Arc<dyn CompletionProvider>>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from explicit settings, falling back to environment variables
    /// for any backend without a configured key.
    pub fn from_settings(settings: &HashMap<Provider, BackendSettings>) -> Result<Self, Error> {
        let mut client = Self::new();

        for &provider in Provider::ALL {
            let configured = settings.get(&provider).cloned().unwrap_or_default();
            let api_key = configured.api_key.or_else(|| provider.env_api_key());

            let backend: Arc<dyn CompletionProvider> = match provider {
                Provider::Anthropic => {
                    let Some(key) = api_key else { continue };
                    match configured.base_url {
                        Some(url) => Arc::new(AnthropicClient::with_base_url(key, url)?),
                        None => Arc::new(AnthropicClient::new(key)?),
                    }
                }
                Provider::Ollama => {
                    // OLLAMA_HOST arrives through the key slot.
                    let base_url = configured
                        .base_url
                        .or_else(|| api_key.map(|host| format!("{}/v1", host.trim_end_matches('/'))))
                        .unwrap_or_else(|| provider.default_base_url().to_string());
                    Arc::new(OpenAICompatClient::with_base_url(provider, "", base_url))
                }
                Provider::OpenAI | Provider::OpenRouter => {
                    let Some(key) = api_key else { continue };
                    let base_url = configured
                        .base_url
                        .unwrap_or_else(|| provider.default_base_url().to_string());
                    Arc::new(OpenAICompatClient::with_base_url(provider, key, base_url))
                }
            };

            client.backends.insert(provider, backend);
        }

        Ok(client)
    }

    /// Register or replace a backend.
    pub fn with_backend(mut self, provider: Provider, backend: Arc<dyn CompletionProvider>) -> Self {
        self.backends.insert(provider, backend);
        self
    }

    pub fn has_backend(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }
}

#[async_trait]
impl CompletionProvider for Client {
    async fn complete(&self, request: CompletionRequest) -> Result<String, Error> {
        let (provider, model) = Provider::split_model(&request.model)
            .ok_or_else(|| Error::UnknownProvider(request.model.clone()))?;

        let backend = self
            .backends
            .get(&provider)
            .ok_or_else(|| Error::MissingApiKey {
                backend: provider.name().to_string(),
                env_vars: provider.env_vars().iter().map(|s| (*s).to_string()).collect(),
            })?;

        backend
            .complete(CompletionRequest {
                model: model.to_string(),
                ..request
            })
            .await
    }
}

//! API provider identification.
//!
//! Model identifiers in the fallback list carry a provider prefix
//! (`openai/gpt-4o-mini`); this module maps that prefix to a backend and
//! knows where each backend reads its credentials from.

use std::env;

/// Supported completion backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    /// Direct OpenAI API
    OpenAI,
    /// Direct Anthropic API
    Anthropic,
    /// OpenRouter aggregator
    OpenRouter,
    /// Local Ollama instance
    Ollama,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::OpenAI,
        Provider::Anthropic,
        Provider::OpenRouter,
        Provider::Ollama,
    ];

    /// Lowercase ID used as the model string prefix.
    pub fn id(&self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
            Provider::OpenRouter => "openrouter",
            Provider::Ollama => "ollama",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAI),
            "anthropic" => Some(Provider::Anthropic),
            "openrouter" => Some(Provider::OpenRouter),
            "ollama" => Some(Provider::Ollama),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::OpenRouter => "OpenRouter",
            Provider::Ollama => "Ollama",
        }
    }

    /// Environment variable(s) holding credentials. For Ollama this is the
    /// host, since no key is needed.
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            Provider::OpenAI => &["OPENAI_API_KEY"],
            Provider::Anthropic => &["ANTHROPIC_API_KEY"],
            Provider::OpenRouter => &["OPENROUTER_API_KEY"],
            Provider::Ollama => &["OLLAMA_HOST"],
        }
    }

    /// First non-empty credential from the environment.
    pub fn env_api_key(&self) -> Option<String> {
        self.env_vars()
            .iter()
            .filter_map(|var| env::var(var).ok())
            .find(|v| !v.is_empty())
    }

    pub fn needs_api_key(&self) -> bool {
        *self != Provider::Ollama
    }

    /// Base URL for the backend's HTTP API.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::OpenRouter => "https://openrouter.ai/api/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Split `provider/model` into its backend and the model name the backend
    /// expects. OpenRouter model names keep their own vendor prefix.
    pub fn split_model(model: &str) -> Option<(Provider, &str)> {
        let (prefix, rest) = model.split_once('/')?;
        let provider = Self::from_id(prefix)?;
        if rest.is_empty() {
            return None;
        }
        Some((provider, rest))
    }
}

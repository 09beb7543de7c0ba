//! OpenAI-compatible API client.

use super::request::{OpenAIMessage, OpenAIRequest};
use super::response::OpenAIResponse;
use crate::provider::api_provider::Provider;
use crate::provider::error::Error;
use crate::provider::http::{AuthConfig, HttpClient};
use crate::provider::types::{CompletionProvider, CompletionRequest, DEFAULT_MAX_TOKENS};
use async_trait::async_trait;

pub struct OpenAICompatClient {
    http: HttpClient,
    provider: Provider,
}

impl OpenAICompatClient {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self::with_base_url(provider, api_key, provider.default_base_url())
    }

    pub fn with_base_url(
        provider: Provider,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let api_key = api_key.into();
        let auth = if provider.needs_api_key() {
            AuthConfig::Bearer(api_key)
        } else {
            AuthConfig::None
        };

        Self {
            http: HttpClient::new(base_url, auth),
            provider,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIRequest {
        // OpenAI's newer models reject max_tokens in favour of
        // max_completion_tokens; the compatible servers only know max_tokens.
        let (max_tokens, max_completion_tokens) = if self.provider == Provider::OpenAI {
            (None, Some(DEFAULT_MAX_TOKENS))
        } else {
            (Some(DEFAULT_MAX_TOKENS), None)
        };

        OpenAIRequest {
            model: request.model.clone(),
            messages: vec![
                OpenAIMessage::system(request.system.clone()),
                OpenAIMessage::user(request.user.clone()),
            ],
            max_tokens,
            max_completion_tokens,
            temperature: Some(0.7),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAICompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, Error> {
        let api_request = self.build_request(&request);

        tracing::debug!(
            provider = %self.provider.id(),
            model = %api_request.model,
            prompt_chars = request.user.len(),
            "OpenAI-compat completion request"
        );

        let response: OpenAIResponse = self
            .http
            .post_json("/chat/completions", &api_request)
            .await?;

        response
            .into_text()
            .ok_or_else(|| Error::EmptyResponse(request.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest::new("gpt-4o-mini", "be terse", "make a button")
    }

    #[test]
    fn test_openai_uses_max_completion_tokens() {
        let client = OpenAICompatClient::new(Provider::OpenAI, "key");
        let api = client.build_request(&request());
        assert_eq!(api.model, "gpt-4o-mini");
        assert_eq!(api.messages.len(), 2);
        assert_eq!(api.messages[0].role, "system");
        assert_eq!(api.messages[1].content, "make a button");
        assert!(api.max_tokens.is_none());
        assert_eq!(api.max_completion_tokens, Some(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn test_compatible_servers_use_max_tokens() {
        let client = OpenAICompatClient::new(Provider::Ollama, "");
        let api = client.build_request(&request());
        assert_eq!(api.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert!(api.max_completion_tokens.is_none());
    }

    #[test]
    fn test_response_text_extraction() {
        let body = r#"{"model":"m","choices":[{"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}]}"#;
        let parsed: OpenAIResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("hello"));

        let empty: OpenAIResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(empty.into_text().is_none());
    }
}

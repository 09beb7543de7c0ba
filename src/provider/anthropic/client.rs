//! Anthropic Messages API client.

use super::request::{AnthropicMessage, AnthropicRequest};
use super::response::AnthropicResponse;
use crate::provider::api_provider::Provider;
use crate::provider::error::Error;
use crate::provider::http::{AuthConfig, HttpClient};
use crate::provider::types::{CompletionProvider, CompletionRequest, DEFAULT_MAX_TOKENS};
use async_trait::async_trait;

const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: HttpClient,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Self::with_base_url(api_key, Provider::Anthropic.default_base_url())
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, Error> {
        let http = HttpClient::new(
            base_url,
            AuthConfig::ApiKey {
                header: "x-api-key".to_string(),
                key: api_key.into(),
            },
        )
        .with_header("anthropic-version", API_VERSION)?;

        Ok(Self { http })
    }

    fn build_request(request: &CompletionRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: request.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: request.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.user.clone(),
            }],
            temperature: Some(0.7),
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, Error> {
        let api_request = Self::build_request(&request);

        tracing::debug!(
            model = %api_request.model,
            prompt_chars = request.user.len(),
            "Anthropic completion request"
        );

        let response: AnthropicResponse = self.http.post_json("/v1/messages", &api_request).await?;

        response
            .into_text()
            .ok_or_else(|| Error::EmptyResponse(request.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_moves_system_out_of_messages() {
        let request = CompletionRequest::new("claude-3-5-haiku-latest", "sys", "usr");
        let api = AnthropicClient::build_request(&request);
        assert_eq!(api.system, "sys");
        assert_eq!(api.messages.len(), 1);
        assert_eq!(api.messages[0].role, "user");
        assert_eq!(api.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn test_response_joins_text_and_skips_other_blocks() {
        let body = r#"{"id":"msg","type":"message","role":"assistant","content":[
            {"type":"thinking","thinking":"hmm"},
            {"type":"text","text":"part one "},
            {"type":"text","text":"part two"}
        ],"model":"claude","stop_reason":"end_turn","usage":{"input_tokens":1,"output_tokens":2}}"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_text().as_deref(), Some("part one part two"));
    }

    #[test]
    fn test_client_builds() {
        assert!(AnthropicClient::new("key").is_ok());
    }
}

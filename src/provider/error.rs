//! Provider error types.

use thiserror::Error;

/// Format an API error for display, extracting message from JSON if present.
///
/// Handles common patterns:
/// - `"HTTP 403: {"error": {"message": "..."}}"` → extracts message
/// - `"HTTP 429: {"error": {"message": "Rate limit"}}"` → extracts message
/// - Plain text errors → returns as-is
#[must_use]
pub fn format_api_error(error: &str) -> String {
    let Some(json_start) = error.find('{') else {
        return error.to_string();
    };

    let Ok(json) = serde_json::from_str::<serde_json::Value>(&error[json_start..]) else {
        return error.to_string();
    };

    match extract_error_message(&json) {
        Some(msg) => {
            let prefix = error[..json_start].trim();
            if prefix.is_empty() {
                msg
            } else {
                format!("{prefix} {msg}")
            }
        }
        None => error.to_string(),
    }
}

/// Pull a readable message out of the usual provider error envelopes:
/// `{"error": {"message", "type"}}` (OpenAI, Anthropic), `{"error": "..."}`
/// (Ollama) and `{"message": "..."}`.
fn extract_error_message(json: &serde_json::Value) -> Option<String> {
    if let Some(error_obj) = json.get("error") {
        if let Some(msg) = error_obj.get("message").and_then(|v| v.as_str()) {
            let kind = error_obj
                .get("code")
                .or_else(|| error_obj.get("type"))
                .and_then(|v| v.as_str());
            return Some(match kind {
                Some(kind) => format!("{msg} ({kind})"),
                None => msg.to_string(),
            });
        }

        if let Some(msg) = error_obj.as_str() {
            return Some(msg.to_string());
        }
    }

    json.get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Missing API key for {backend}. Set one of: {}", env_vars.join(", "))]
    MissingApiKey {
        backend: String,
        env_vars: Vec<String>,
    },

    #[error("Unknown provider in model id: {0}")]
    UnknownProvider(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Empty completion from {0}")]
    EmptyResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_openai_error() {
        let error = r#"HTTP 429: {"error":{"message":"Rate limit exceeded","type":"rate_limit_error","code":"rate_limit_exceeded"}}"#;
        assert_eq!(
            format_api_error(error),
            "HTTP 429: Rate limit exceeded (rate_limit_exceeded)"
        );
    }

    #[test]
    fn test_format_anthropic_error() {
        let error = r#"HTTP 529: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(format_api_error(error), "HTTP 529: Overloaded (overloaded_error)");
    }

    #[test]
    fn test_format_ollama_error() {
        let error = r#"HTTP 404: {"error":"model 'llama9' not found"}"#;
        assert_eq!(format_api_error(error), "HTTP 404: model 'llama9' not found");
    }

    #[test]
    fn test_format_plain_and_broken() {
        assert_eq!(format_api_error("Connection refused"), "Connection refused");
        assert_eq!(
            format_api_error("HTTP 500: {invalid json}"),
            "HTTP 500: {invalid json}"
        );
    }

    #[test]
    fn test_missing_key_lists_env_vars() {
        let err = Error::MissingApiKey {
            backend: "OpenAI".into(),
            env_vars: vec!["OPENAI_API_KEY".into()],
        };
        assert_eq!(
            err.to_string(),
            "Missing API key for OpenAI. Set one of: OPENAI_API_KEY"
        );
    }
}

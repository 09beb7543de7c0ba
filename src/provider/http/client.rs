//! JSON-over-HTTP client shared by the completion backends.

use crate::provider::error::{Error, format_api_error};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;

/// Generation responses are long; allow for slow models.
const TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How a backend expects its credential.
#[derive(Clone)]
pub enum AuthConfig {
    /// `Authorization: Bearer {token}`
    Bearer(String),
    /// Custom header, e.g. `x-api-key: {key}`
    ApiKey { header: String, key: String },
    None,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::ApiKey { header, .. } => f
                .debug_struct("ApiKey")
                .field("header", header)
                .field("key", &"[REDACTED]")
                .finish(),
            Self::None => f.write_str("None"),
        }
    }
}

#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    auth: AuthConfig,
    extra_headers: HeaderMap,
}

impl HttpClient {
    pub fn new(base_url: impl Into<String>, auth: AuthConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            extra_headers: HeaderMap::new(),
        }
    }

    /// Attach a static header sent with every request (API version pins and
    /// the like). Invalid names or values are rejected up front.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, Error> {
        let name = HeaderName::try_from(name)
            .map_err(|_| Error::Api(format!("Invalid header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Api(format!("Invalid value for header {name}")))?;
        self.extra_headers.insert(name, value);
        Ok(self)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = self.extra_headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        match &self.auth {
            AuthConfig::Bearer(token) => {
                let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                    Error::Api("Bearer token contains invalid header characters".into())
                })?;
                headers.insert(AUTHORIZATION, value);
            }
            AuthConfig::ApiKey { header, key } => {
                let name = HeaderName::try_from(header.as_str())
                    .map_err(|_| Error::Api("API key header name is invalid".into()))?;
                let value = HeaderValue::from_str(key)
                    .map_err(|_| Error::Api("API key contains invalid header characters".into()))?;
                headers.insert(name, value);
            }
            AuthConfig::None => {}
        }

        Ok(headers)
    }

    /// POST a JSON body and decode the JSON response.
    pub async fn post_json<T: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<R, Error> {
        let url = format!("{}{path}", self.base_url);
        let headers = self.build_headers()?;

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after_value);
            return Err(Error::RateLimited { retry_after });
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Api(format_api_error(&format!(
                "HTTP {}: {text}",
                status.as_u16()
            ))));
        }

        serde_json::from_str(&text)
            .map_err(|e| Error::Api(format!("Failed to parse response: {e}")))
    }
}

/// Parse a `Retry-After` value as whole seconds, rounding fractions up.
/// HTTP-date values are ignored.
fn parse_retry_after_value(s: &str) -> Option<u64> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Some(secs.max(1));
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f > 0.0 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some((f.ceil() as u64).max(1))
    } else {
        None
    }
}

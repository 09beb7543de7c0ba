//! Failure classification for model attempts.

/// Classify a provider failure.
///
/// Returns `Some(category)` for transient failures (a later model or a later
/// request may succeed), `None` for failures that point at configuration or
/// the request itself.
pub fn failure_category(err: &str) -> Option<&'static str> {
    let lower = err.to_lowercase();

    if err.contains("429") || lower.contains("rate limit") {
        return Some("Rate limited");
    }

    if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline") {
        return Some("Request timed out");
    }

    if ["connection", "network", "dns", "resolve"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        return Some("Network error");
    }

    let server_codes = ["500", "502", "503", "504", "529"];
    if server_codes.iter().any(|code| err.contains(code))
        || lower.contains("server error")
        || lower.contains("overloaded")
        || lower.contains("service unavailable")
        || lower.contains("bad gateway")
    {
        return Some("Server error");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit() {
        assert_eq!(failure_category("HTTP 429: slow down"), Some("Rate limited"));
        assert_eq!(
            failure_category("Rate limited, retry after Some(3)s"),
            Some("Rate limited")
        );
    }

    #[test]
    fn test_timeout_and_network() {
        assert_eq!(
            failure_category("operation timed out"),
            Some("Request timed out")
        );
        assert_eq!(
            failure_category("error trying to connect: dns error"),
            Some("Network error")
        );
    }

    #[test]
    fn test_server_errors() {
        assert_eq!(failure_category("HTTP 503: unavailable"), Some("Server error"));
        assert_eq!(failure_category("HTTP 529: Overloaded"), Some("Server error"));
    }

    #[test]
    fn test_permanent_failures() {
        assert_eq!(failure_category("HTTP 401: Unauthorized"), None);
        assert_eq!(
            failure_category("Missing API key for OpenAI. Set one of: OPENAI_API_KEY"),
            None
        );
    }
}

use thiserror::Error;

/// Failures talking to an external storage or inference provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credential absent; the dependency is unavailable.
    #[error("not configured")]
    NotConfigured,

    #[error("authentication failed: {0}")]
    Auth(String),

    /// Quota or rate limit hit. Never retried.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_))
    }

    /// Classify a non-success HTTP reply by status and message text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_message(body);
        if status == 429 || mentions_rate_limit(&message) {
            ProviderError::RateLimited(message)
        } else if status == 401 || status == 403 {
            ProviderError::Auth(message)
        } else {
            ProviderError::Api { status, message }
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ProviderError::InvalidResponse(e.to_string())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Whether a provider message describes quota exhaustion.
pub fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["quota", "rate limit", "rate-limit", "resource_exhausted", "too many requests"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Pull `error.message` out of a Google-style JSON error body, else the raw body.
fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_is_rate_limited() {
        let err = ProviderError::from_status(429, "slow down");
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "rate limited: slow down");
    }

    #[test]
    fn quota_message_is_rate_limited_regardless_of_status() {
        let body = r#"{"error":{"code":400,"message":"Quota exceeded for metric","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = ProviderError::from_status(400, body);
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("Quota exceeded"));
    }

    #[test]
    fn auth_and_generic_errors() {
        assert!(matches!(
            ProviderError::from_status(401, "bad token"),
            ProviderError::Auth(_)
        ));
        match ProviderError::from_status(500, "boom") {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

//! Provider error types for wayfinder-llm.
//!
//! All provider operations return [`Result<T>`] which uses [`ProviderError`]
//! as the error type. Callers outside this crate usually convert into
//! [`WayfinderError`] with `?`.

use thiserror::Error;
use wayfinder_types::WayfinderError;

/// Errors that can occur when interacting with an LLM provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The HTTP request to the provider failed.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Authentication with the provider was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The provider returned a rate-limit response (HTTP 429).
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested wait time before retrying, in milliseconds.
        retry_after_ms: u64,
    },

    /// The requested model does not exist on the provider.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The provider has not been configured (e.g. missing API key).
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// The provider returned a response that could not be parsed.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// An HTTP-level error from reqwest.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// Whether this is the transient rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

impl From<ProviderError> for WayfinderError {
    fn from(err: ProviderError) -> Self {
        WayfinderError::Provider {
            message: err.to_string(),
        }
    }
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_request_failed() {
        let err = ProviderError::RequestFailed("connection reset".into());
        assert_eq!(err.to_string(), "request failed: connection reset");
    }

    #[test]
    fn display_rate_limited() {
        let err = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited: retry after 5000ms");
        assert!(err.is_rate_limited());
    }

    #[test]
    fn only_rate_limited_is_rate_limited() {
        assert!(!ProviderError::AuthFailed("nope".into()).is_rate_limited());
        assert!(!ProviderError::InvalidResponse("bad".into()).is_rate_limited());
    }

    #[test]
    fn display_not_configured() {
        let err = ProviderError::NotConfigured("set AI_API_KEY env var".into());
        assert_eq!(
            err.to_string(),
            "provider not configured: set AI_API_KEY env var"
        );
    }

    #[test]
    fn converts_into_wayfinder_error() {
        let err: WayfinderError = ProviderError::AuthFailed("invalid token".into()).into();
        assert!(matches!(err, WayfinderError::Provider { .. }));
        assert_eq!(
            err.to_string(),
            "provider error: authentication failed: invalid token"
        );
    }

    #[test]
    fn json_error_from_conversion() {
        let serde_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let provider_err: ProviderError = serde_err.into();
        assert!(provider_err.to_string().starts_with("json error:"));
    }
}

//! OpenAI-compatible provider implementation.
//!
//! [`OpenAiCompatProvider`] works with any API that follows the OpenAI chat
//! completion format (OpenAI itself, Azure-style gateways, local servers
//! such as Ollama or vLLM).

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::LlmProviderConfig;
use crate::error::{ProviderError, Result};
use crate::provider::Provider;
use crate::types::{ChatRequest, ChatResponse};

/// Default retry hint when a 429 carries none.
const DEFAULT_RETRY_AFTER_MS: u64 = 1000;

/// An LLM provider that uses the OpenAI-compatible chat completion API.
pub struct OpenAiCompatProvider {
    config: LlmProviderConfig,
    http: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    /// Create a new provider from configuration.
    ///
    /// The API key will be resolved from the environment variable specified
    /// in `config.api_key_env` at request time.
    pub fn new(config: LlmProviderConfig) -> Self {
        let http = build_client(&config);
        Self {
            config,
            http,
            api_key: None,
        }
    }

    /// Create a new provider with an explicit API key.
    pub fn with_api_key(config: LlmProviderConfig, api_key: String) -> Self {
        let http = build_client(&config);
        Self {
            config,
            http,
            api_key: Some(api_key),
        }
    }

    pub fn config(&self) -> &LlmProviderConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    /// Resolve the API key: explicit key > environment variable.
    fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!("set {} env var", self.config.api_key_env))
            })
    }

    /// Map a non-2xx response to the matching [`ProviderError`].
    async fn error_for_status(&self, request: &ChatRequest, response: reqwest::Response) -> ProviderError {
        let status = response.status();

        if status.as_u16() == 429 {
            // Retry-After header first, then body JSON, then default.
            let header_ms = parse_retry_after_header(&response);
            let body = response.text().await.unwrap_or_default();

            // Exhausted credits come back as 429 too; waiting will not help.
            if is_quota_exhausted(&body) {
                let msg = extract_error_message(&body)
                    .unwrap_or_else(|| "credits exhausted or spending limit reached".into());
                warn!(provider = %self.config.name, "quota exhausted (not retryable)");
                return ProviderError::RequestFailed(msg);
            }

            let retry_ms = header_ms
                .or_else(|| parse_retry_after_ms(&body))
                .unwrap_or(DEFAULT_RETRY_AFTER_MS);
            debug!(
                provider = %self.config.name,
                retry_after_ms = retry_ms,
                "rate limited"
            );
            return ProviderError::RateLimited {
                retry_after_ms: retry_ms,
            };
        }

        let body = response.text().await.unwrap_or_default();
        match status.as_u16() {
            401 | 403 => ProviderError::AuthFailed(body),
            404 => ProviderError::ModelNotFound(format!("model '{}': {}", request.model, body)),
            _ => ProviderError::RequestFailed(format!("HTTP {status}: {body}")),
        }
    }
}

fn build_client(config: &LlmProviderConfig) -> reqwest::Client {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "falling back to default HTTP client");
        reqwest::Client::new()
    })
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self.resolve_api_key()?;
        let url = self.completions_url();

        debug!(
            provider = %self.config.name,
            model = %request.model,
            messages = request.messages.len(),
            structured = request.response_format.is_some(),
            "sending chat completion request"
        );

        let mut req = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json");

        for (k, v) in &self.config.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.json(request).send().await?;
        if !response.status().is_success() {
            return Err(self.error_for_status(request, response).await);
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("failed to parse response: {e}"))
        })?;

        debug!(
            provider = %self.config.name,
            model = %chat_response.model,
            choices = chat_response.choices.len(),
            "chat completion response received"
        );

        Ok(chat_response)
    }
}

/// Whether a 429 body means exhausted quota rather than a transient limit.
fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("exhausted")
        || lower.contains("spending limit")
        || lower.contains("billing")
        || lower.contains("quota exceeded")
        || lower.contains("insufficient_quota")
}

/// Extract a human-readable error message from a JSON error response body.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("error").and_then(|v| {
        // {"error": {"message": "..."}} or {"error": "..."}
        v.get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .or_else(|| v.as_str().map(String::from))
    })
}

/// Numeric `Retry-After` header, in milliseconds. HTTP-date values are ignored.
fn parse_retry_after_header(response: &reqwest::Response) -> Option<u64> {
    let header_val = response
        .headers()
        .get("retry-after")
        .or_else(|| response.headers().get("x-ratelimit-reset-after"))
        .and_then(|v| v.to_str().ok())?;

    header_val
        .trim()
        .parse::<f64>()
        .ok()
        .map(|secs| (secs * 1000.0).max(0.0) as u64)
}

/// `retry_after_ms` or `retry_after` (seconds) from a JSON error body.
fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after_ms")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            value
                .get("retry_after")
                .and_then(|v| v.as_f64())
                .map(|secs| (secs * 1000.0) as u64)
        })
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.config.name)
            .field("base_url", &self.config.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

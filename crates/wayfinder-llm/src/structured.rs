//! Structured-output completion.
//!
//! [`complete_structured`] is the capability the rest of wayfinder uses:
//! send a request (normally carrying a JSON-schema `response_format`) and
//! parse the first choice into `T`. Transport failures are errors; a
//! response that arrives but cannot be interpreted is `Ok(None)`, leaving
//! the caller to decide whether an empty result is fatal.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::Result;
use crate::provider::Provider;
use crate::types::ChatRequest;

/// Execute `request` and parse the first choice's content as `T`.
///
/// Returns `Ok(None)` when the response has no choices, no content, a
/// refusal, or content that does not deserialize into `T`.
pub async fn complete_structured<T>(
    provider: &dyn Provider,
    request: &ChatRequest,
) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    let response = provider.complete(request).await?;

    if let Some(refusal) = response
        .choices
        .first()
        .and_then(|c| c.message.refusal.as_deref())
    {
        warn!(provider = provider.name(), refusal, "model refused structured request");
        return Ok(None);
    }

    let Some(content) = response.first_content() else {
        warn!(provider = provider.name(), "response carried no content");
        return Ok(None);
    };

    match serde_json::from_str::<T>(strip_code_fence(content)) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            warn!(
                provider = provider.name(),
                error = %e,
                "structured response did not match schema"
            );
            Ok(None)
        }
    }
}

/// Some OpenAI-compatible servers wrap JSON in a markdown fence even when
/// asked for structured output.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

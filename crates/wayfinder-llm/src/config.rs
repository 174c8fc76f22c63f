//! Connection settings for the OpenAI-compatible endpoint.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use wayfinder_types::config::GenerationConfig;

/// Configuration for a single LLM provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Human-readable provider name, used in logs.
    pub name: String,

    /// Base URL for the OpenAI-compatible API (e.g. "https://api.openai.com/v1").
    pub base_url: String,

    /// Environment variable that holds the API key (e.g. "AI_API_KEY").
    pub api_key_env: String,

    /// Extra HTTP headers to include in every request to this provider.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds. `None` leaves the client default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl From<&GenerationConfig> for LlmProviderConfig {
    fn from(generation: &GenerationConfig) -> Self {
        Self {
            name: "openai".into(),
            base_url: generation.base_url.clone(),
            api_key_env: generation.api_key_env.clone(),
            headers: HashMap::new(),
            timeout_secs: None,
        }
    }
}

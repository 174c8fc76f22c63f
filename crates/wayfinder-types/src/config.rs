//! Configuration schema.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration. Fields accept both `snake_case` and
//! `camelCase` names; unknown fields are ignored.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WayfinderError};

/// Environment variable overriding [`GenerationConfig::model`].
pub const MODEL_ENV: &str = "AI_MODEL";
/// Environment variable overriding [`GenerationConfig::base_url`].
pub const MODEL_URL_ENV: &str = "AI_MODEL_URL";

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Synthetic data generation (LLM endpoint, concurrency, rate limits).
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Where generated routes and sessions are cached.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Text vectorization knobs shared by every engine.
    #[serde(default)]
    pub vectorizer: VectorizerConfig,

    /// Where trained models are stored.
    #[serde(default)]
    pub models: ModelsConfig,
}

impl Config {
    /// Load configuration from a JSON file, or defaults when `path` is `None`.
    ///
    /// A path that does not exist is an error; a missing path argument is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(WayfinderError::ConfigInvalid {
                reason: format!("config file not found: {}", path.display()),
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` (usually `std::env::var(..).ok()`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.generation.model = model;
        }
        if let Some(url) = lookup(MODEL_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.generation.base_url = url;
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generation.max_in_flight == 0 {
            return Err(WayfinderError::ConfigInvalid {
                reason: "generation.max_in_flight must be at least 1".into(),
            });
        }
        if self.generation.session_batch_size == 0 {
            return Err(WayfinderError::ConfigInvalid {
                reason: "generation.session_batch_size must be at least 1".into(),
            });
        }
        let max_df = self.vectorizer.max_df;
        if !(max_df > 0.0 && max_df <= 1.0) {
            return Err(WayfinderError::ConfigInvalid {
                reason: format!("vectorizer.max_df must be in (0, 1], got {max_df}"),
            });
        }
        Ok(())
    }
}

// ── Generation ───────────────────────────────────────────────────────────

/// Settings for the synthetic navigation-data generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier sent to the OpenAI-compatible endpoint.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url", alias = "baseUrl")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env", alias = "apiKeyEnv")]
    pub api_key_env: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Capacity of the admission gate (concurrent in-flight calls).
    #[serde(default = "default_max_in_flight", alias = "maxInFlight")]
    pub max_in_flight: usize,

    /// Maximum sessions requested per call.
    #[serde(default = "default_session_batch_size", alias = "sessionBatchSize")]
    pub session_batch_size: usize,

    /// How long the whole gate pauses after a rate-limit response.
    #[serde(
        default = "default_rate_limit_cooldown_secs",
        alias = "rateLimitCooldownSecs"
    )]
    pub rate_limit_cooldown_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_api_key_env() -> String {
    "AI_API_KEY".into()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_in_flight() -> usize {
    5
}
fn default_session_batch_size() -> usize {
    50
}
fn default_rate_limit_cooldown_secs() -> u64 {
    60
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_in_flight: default_max_in_flight(),
            session_batch_size: default_session_batch_size(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
        }
    }
}

// ── Cache / models ───────────────────────────────────────────────────────

/// Data-cache location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one JSON file per cache key. `~/` is expanded.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

fn default_cache_dir() -> String {
    "~/.wayfinder/cache".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

impl CacheConfig {
    pub fn dir_path(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

/// Model-store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Directory holding `<name>.json` model files. `~/` is expanded.
    #[serde(default = "default_models_dir")]
    pub dir: String,
}

fn default_models_dir() -> String {
    "~/.wayfinder/models".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
        }
    }
}

impl ModelsConfig {
    pub fn dir_path(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

// ── Vectorizer ───────────────────────────────────────────────────────────

/// TF-IDF knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    /// Keep at most this many terms (highest corpus frequency). `None` keeps all.
    #[serde(default = "default_max_features", alias = "maxFeatures")]
    pub max_features: Option<usize>,

    /// Drop terms appearing in fewer than this many documents.
    #[serde(default = "default_min_df", alias = "minDf")]
    pub min_df: usize,

    /// Drop terms appearing in more than this proportion of documents.
    #[serde(default = "default_max_df", alias = "maxDf")]
    pub max_df: f64,

    /// Remove English stop words before counting.
    #[serde(default = "default_stop_words", alias = "stopWords")]
    pub stop_words: bool,
}

fn default_max_features() -> Option<usize> {
    Some(1000)
}
fn default_min_df() -> usize {
    1
}
fn default_max_df() -> f64 {
    1.0
}
fn default_stop_words() -> bool {
    true
}

impl Default for VectorizerConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            min_df: default_min_df(),
            max_df: default_max_df(),
            stop_words: default_stop_words(),
        }
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

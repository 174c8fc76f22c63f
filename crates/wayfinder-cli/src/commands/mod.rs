//! CLI command implementations for `wayfinder`.
//!
//! Each subcommand is implemented in its own module:
//!
//! - [`generate`] -- Build or top up the cached dataset.
//! - [`train`] -- Train and save engines.
//! - [`predict`] -- Rank routes for a query.
//! - [`evaluate`] -- Held-out evaluation.

pub mod evaluate;
pub mod generate;
pub mod predict;
pub mod train;

use std::path::Path;
use std::sync::Arc;

use clap::Args;
use tracing::debug;

use wayfinder_core::{DatasetRequest, ModelStore, NavigationCache, NavigationSynthesizer, TrainingPipeline};
use wayfinder_llm::{LlmProviderConfig, OpenAiCompatProvider};
use wayfinder_types::Config;

/// Which dataset to build; shared by `generate`, `train` and `evaluate`.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Plain-language description of the application.
    #[arg(short, long)]
    pub description: String,

    /// Number of routes to generate.
    #[arg(short, long, default_value = "10")]
    pub routes: usize,

    /// Number of sessions per route.
    #[arg(short, long, default_value = "50")]
    pub sessions: usize,

    /// Generate fresh data instead of reusing the cache.
    #[arg(long)]
    pub force_new: bool,
}

impl DatasetArgs {
    pub fn request(&self) -> DatasetRequest {
        DatasetRequest::new(self.description.clone(), self.routes, self.sessions)
            .with_force_new(self.force_new)
    }
}

/// Load configuration from an optional path, apply env overrides, validate.
pub fn load_config(config_override: Option<&str>) -> anyhow::Result<Config> {
    let mut config = Config::load(config_override.map(Path::new))?;
    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    debug!(
        path = config_override.unwrap_or("<defaults>"),
        model = %config.generation.model,
        "configuration loaded"
    );
    Ok(config)
}

/// Wire provider, synthesizer, cache and model store from `config`.
pub fn build_pipeline(config: &Config) -> TrainingPipeline {
    let provider = OpenAiCompatProvider::new(LlmProviderConfig::from(&config.generation));
    let synthesizer = NavigationSynthesizer::new(Arc::new(provider), &config.generation);
    let cache = NavigationCache::new(config.cache.dir_path(), Arc::new(synthesizer));
    let store = ModelStore::new(config.models.dir_path());
    TrainingPipeline::new(cache, store, config.vectorizer.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_without_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.generation.max_in_flight, 5);
    }

    #[test]
    fn load_config_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wayfinder.json");
        std::fs::write(&path, r#"{"cache": {"dir": "/tmp/wf-cache"}}"#).unwrap();
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.cache.dir_path(), Path::new("/tmp/wf-cache"));
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"generation": {"max_in_flight": 0}}"#).unwrap();
        assert!(load_config(path.to_str()).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = load_config(Some("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn dataset_args_build_request() {
        let args = DatasetArgs {
            description: "flight booking admin panel".into(),
            routes: 5,
            sessions: 20,
            force_new: true,
        };
        let request = args.request();
        assert_eq!(request.routes, 5);
        assert_eq!(request.sessions_per_route, 20);
        assert!(request.force_new);
    }
}

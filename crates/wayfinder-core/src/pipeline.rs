//! Training pipeline: cached data in, saved engines out.

use tracing::info;

use wayfinder_types::config::VectorizerConfig;
use wayfinder_types::{NavigationContext, Result};

use crate::cache::NavigationCache;
use crate::engine::{EngineKind, RouteEngine};
use crate::model_store::ModelStore;

/// How much data to build for one domain.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRequest {
    pub description: String,
    pub routes: usize,
    pub sessions_per_route: usize,
    pub force_new: bool,
}

impl DatasetRequest {
    pub fn new(description: impl Into<String>, routes: usize, sessions_per_route: usize) -> Self {
        Self {
            description: description.into(),
            routes,
            sessions_per_route,
            force_new: false,
        }
    }

    pub fn with_force_new(mut self, force_new: bool) -> Self {
        self.force_new = force_new;
        self
    }
}

/// Ties cache, engines and model store together.
pub struct TrainingPipeline {
    cache: NavigationCache,
    store: ModelStore,
    vectorizer: VectorizerConfig,
}

impl TrainingPipeline {
    pub fn new(cache: NavigationCache, store: ModelStore, vectorizer: VectorizerConfig) -> Self {
        Self {
            cache,
            store,
            vectorizer,
        }
    }

    pub fn cache(&self) -> &NavigationCache {
        &self.cache
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn vectorizer(&self) -> &VectorizerConfig {
        &self.vectorizer
    }

    /// Fetch (or top up) the dataset described by `request`.
    pub async fn build_context(&self, request: &DatasetRequest) -> Result<NavigationContext> {
        self.cache
            .get_or_create_context(
                &request.description,
                request.routes,
                request.sessions_per_route,
                request.force_new,
            )
            .await
    }

    /// Train one engine of `kind` on `context`.
    pub fn train_engine(&self, kind: EngineKind, context: &NavigationContext) -> Result<RouteEngine> {
        let mut engine = RouteEngine::new(kind, self.vectorizer.clone());
        engine.train(context.routes(), context.sessions())?;
        Ok(engine)
    }

    /// Build the dataset, then train and save one engine per kind.
    ///
    /// Returns the saved model names in `kinds` order. Any failure aborts
    /// the run; engines saved before the failure stay on disk.
    pub async fn run(&self, request: &DatasetRequest, kinds: &[EngineKind]) -> Result<Vec<String>> {
        let context = self.build_context(request).await?;
        let mut saved = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let engine = self.train_engine(kind, &context)?;
            let name = kind.model_name();
            self.store.save(&engine, &name)?;
            saved.push(name);
        }
        info!(models = ?saved, "training pipeline finished");
        Ok(saved)
    }
}

//! # wayfinder-core
//!
//! Core engine for wayfinder: predicting which route of an application a
//! free-text query is looking for.
//!
//! Contains the navigation data synthesizer, the on-disk data cache, route
//! documents, TF-IDF vectorization, the ranking engines, model persistence,
//! held-out evaluation and the training pipeline that ties them together.

pub mod nlp;
pub mod documentor;
pub mod vectorizer;
pub mod classifier;
pub mod engine;
pub mod synthesizer;
pub mod cache;
pub mod model_store;
pub mod evaluation;
pub mod pipeline;

pub use cache::NavigationCache;
pub use engine::{EngineKind, RouteEngine};
pub use model_store::{ModelRegistry, ModelStore};
pub use pipeline::{DatasetRequest, TrainingPipeline};
pub use synthesizer::{NavigationSource, NavigationSynthesizer};

//! Error types for wayfinder.
//!
//! [`WayfinderError`] is shared by every crate in the workspace. It is
//! non-exhaustive so new failure kinds can be added without breaking
//! downstream matches.

use thiserror::Error;

/// Top-level error type for wayfinder.
///
/// Generation and training failures abort the pipeline with one of these.
/// Prediction never returns an error; it degrades to an empty ranking.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WayfinderError {
    /// The generative service produced no usable structured output.
    #[error("generation failed: {reason}")]
    Generation {
        /// What was being generated and why it failed.
        reason: String,
    },

    /// The generative service rejected or failed the request (auth, HTTP, config).
    #[error("provider error: {message}")]
    Provider {
        /// Provider-supplied error message.
        message: String,
    },

    /// Training input is empty or violates a data-model invariant.
    #[error("invalid training data: {reason}")]
    InvalidTrainingData {
        /// What is wrong with the input.
        reason: String,
    },

    /// No persisted model exists under the requested name.
    #[error("model not found: {name}")]
    ModelNotFound {
        /// The requested model name.
        name: String,
    },

    /// A persisted model could not be interpreted.
    #[error("unsupported model file: {reason}")]
    ModelFormat {
        /// What is wrong with the file.
        reason: String,
    },

    /// Configuration is malformed or semantically invalid.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout wayfinder.
pub type Result<T> = std::result::Result<T, WayfinderError>;

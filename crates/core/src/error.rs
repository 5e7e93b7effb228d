//! Error types for taxguide.
//!
//! A single error enum covers every failure category the answering pipeline
//! can surface: configuration, I/O, provider calls, retrieval, caching and
//! prompt rendering.

use thiserror::Error;

/// Unified error type for taxguide.
///
/// Only retrieval and generation-provider failures are meant to reach the
/// transport layer. Low-evidence answers and off-topic questions are normal
/// responses, and cache failures are logged and swallowed where they occur.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Document store and retrieval errors
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Cache store errors (never fatal to a request)
    #[error("Cache error: {0}")]
    Cache(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error means the question could not be grounded because
    /// retrieval itself failed (as opposed to "nothing relevant was found").
    pub fn is_retrieval_failure(&self) -> bool {
        matches!(self, AppError::Retrieval(_) | AppError::Embedding(_))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

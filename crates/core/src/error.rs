//! Error types for bookchat.
//!
//! One enum covers every failure category of the index and its front ends:
//! configuration, I/O, malformed ingestion input, vector dimension
//! mismatches, missing records, inconsistent persisted state, and embedding
//! provider failures.

use thiserror::Error;

/// Unified error type for bookchat.
///
/// All fallible functions return `Result<T, AppError>`.
/// Bad input is reported, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or empty ingestion input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Vector length does not match the index dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },

    /// Unknown chunk or book, or no persisted state yet
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted vectors and metadata disagree
    #[error("Corrupt index state: {0}")]
    CorruptState(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Whether this error only signals absent persisted state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
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

//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Result type alias for embedding store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised while turning text into vectors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A local model could not be loaded or stopped running.
    #[error("local model unavailable: {0}")]
    ModelUnavailable(String),

    /// Text too long for embedding.
    #[error("text too long: {length} characters, max {max_length}")]
    TextTooLong { length: usize, max_length: usize },
}

/// Errors raised by the embedding store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Records must have a non-empty key.
    #[error("record key must not be empty")]
    EmptyKey,

    /// Vectors must have at least one component.
    #[error("vector must not be empty")]
    EmptyVector,

    /// Vector components must be finite; NaN and infinities cannot be persisted.
    #[error("vector component {index} is not finite")]
    InvalidVector { index: usize },

    /// Vector length does not match the store dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No record for the key.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The backing file could not be read, decoded or written.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Unavailable(format!("corrupt snapshot: {err}"))
    }
}

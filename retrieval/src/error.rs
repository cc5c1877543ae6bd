//! Error types for ingestion and querying.

use std::fmt;

use thiserror::Error;
use vdb_embeddings::{EmbeddingError, StoreError};
use vdb_sources::{CaptionError, ExtractionError};

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur while ingesting or querying.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Nothing to ingest.
    #[error("text is empty")]
    EmptyText,

    /// Nothing to search for.
    #[error("query is empty")]
    EmptyQuery,

    /// Records must have a non-empty key.
    #[error("key is empty")]
    EmptyKey,

    /// Vector length does not match the store dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// No record for the key.
    #[error("record not found: {0}")]
    NotFound(String),

    /// The vectorizer failed.
    #[error("vectorization failed: {0}")]
    Vectorization(#[from] EmbeddingError),

    /// Caption lookup failed.
    #[error(transparent)]
    Captions(#[from] CaptionError),

    /// Text extraction failed.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The store could not be read or written.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Coarse classification of a [`RetrievalError`], for callers that map
/// errors onto another protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    EmptyText,
    EmptyQuery,
    EmptyKey,
    DimensionMismatch,
    NotFound,
    VectorizationFailed,
    NoCaptions,
    FetchError,
    InvalidUrl,
    ExtractionError,
    StoreUnavailable,
    Config,
}

impl ErrorKind {
    /// Stable identifier, e.g. `empty_text`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyText => "empty_text",
            Self::EmptyQuery => "empty_query",
            Self::EmptyKey => "empty_key",
            Self::DimensionMismatch => "dimension_mismatch",
            Self::NotFound => "not_found",
            Self::VectorizationFailed => "vectorization_failed",
            Self::NoCaptions => "no_captions",
            Self::FetchError => "fetch_error",
            Self::InvalidUrl => "invalid_url",
            Self::ExtractionError => "extraction_error",
            Self::StoreUnavailable => "store_unavailable",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl RetrievalError {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyText => ErrorKind::EmptyText,
            Self::EmptyQuery => ErrorKind::EmptyQuery,
            Self::EmptyKey => ErrorKind::EmptyKey,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Vectorization(_) => ErrorKind::VectorizationFailed,
            Self::Captions(CaptionError::InvalidUrl(_)) => ErrorKind::InvalidUrl,
            Self::Captions(CaptionError::NoCaptions(_)) => ErrorKind::NoCaptions,
            Self::Captions(CaptionError::Fetch(_)) => ErrorKind::FetchError,
            Self::Extraction(_) => ErrorKind::ExtractionError,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyKey => Self::EmptyKey,
            // Empty or non-finite vectors can only come from a misbehaving vectorizer.
            StoreError::EmptyVector => Self::Vectorization(EmbeddingError::InvalidResponse(
                "vectorizer returned an empty vector".to_string(),
            )),
            StoreError::InvalidVector { index } => {
                Self::Vectorization(EmbeddingError::InvalidResponse(format!(
                    "vectorizer returned a non-finite value at component {index}"
                )))
            }
            StoreError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            StoreError::NotFound(key) => Self::NotFound(key),
            StoreError::Unavailable(detail) => Self::StoreUnavailable(detail),
        }
    }
}

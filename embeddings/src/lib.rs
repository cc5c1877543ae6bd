//! # Embeddings
//!
//! This crate provides the vector side of VDB: turning text into embeddings,
//! keeping one embedding per key, and ranking stored embeddings against a
//! query.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors (local model or OpenAI)
//! - **Embedding Store**: Durable key -> (text, vector) map with atomic upserts
//! - **Similarity Ranking**: Deterministic top-k by cosine similarity
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider ──► Embedding ──► EmbeddingStore            │
//! │                            │              │                     │
//! │                            ▼              ▼                     │
//! │                        Ranker  ◄──── scan_all                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod local;
pub mod provider;
pub mod ranker;
pub mod similarity;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{EmbeddingError, Result, StoreError, StoreResult};
pub use local::{FASTEMBED_DIMENSION, FastEmbedProvider};
pub use provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider};
pub use ranker::{BruteForceRanker, Ranker, ScoredRecord};
pub use similarity::cosine_similarity;
pub use store::{EmbeddingStore, Record};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

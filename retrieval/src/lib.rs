//! # Retrieval
//!
//! Ingestion and search on top of the embedding store:
//!
//! - **Ingestion**: text, documents or YouTube captions -> vector -> store
//! - **Query**: text -> vector -> ranked matches
//! - **Configuration**: TOML file with `VDB_*` environment overrides
//!
//! ## Architecture
//!
//! ```text
//!   text / file / video                      query text
//!          │                                      │
//!          ▼                                      ▼
//!  IngestionPipeline ──► EmbeddingProvider ◄── QueryService
//!          │                                      │
//!          ▼                                      ▼
//!   EmbeddingStore ─────────── scan_all ───────► Ranker ──► top-k
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vdb_retrieval::{Engine, VdbConfig};
//!
//! let engine = Engine::from_config(VdbConfig::load("vdb.toml").await?).await?;
//! engine.ingest("notes", "cats are great").await?;
//!
//! let matches = engine.query("feline pets", None).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod query;

pub use config::{EmbeddingProviderType, VdbConfig};
pub use engine::{Engine, EngineBuilder, EngineStats};
pub use error::{ErrorKind, Result, RetrievalError};
pub use ingest::{IngestionPipeline, normalize_text};
pub use query::QueryService;

// Re-export from dependencies for convenience
pub use vdb_embeddings::{EmbeddingProvider, EmbeddingStore, Ranker, Record, ScoredRecord};
pub use vdb_sources::{CaptionSource, LanguagePolicy};

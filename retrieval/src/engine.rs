//! The engine wiring store, vectorizer, ranker and caption source together.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use vdb_embeddings::{
    BruteForceRanker, EmbeddingProvider, EmbeddingStore, FastEmbedProvider, OpenAIProvider,
    Ranker, Record, ScoredRecord, StoreError,
};
use vdb_sources::{CaptionSource, YouTubeCaptionSource};

use crate::config::{EmbeddingConfig, EmbeddingProviderType, VdbConfig};
use crate::error::{Result, RetrievalError};
use crate::ingest::IngestionPipeline;
use crate::query::QueryService;

/// Entry point for ingesting and querying.
///
/// Every collaborator is injected; [`EngineBuilder`] fills in whatever the
/// caller does not provide from a [`VdbConfig`].
pub struct Engine {
    config: VdbConfig,
    store: Arc<EmbeddingStore>,
    provider: Arc<dyn EmbeddingProvider>,
    ingestion: IngestionPipeline,
    queries: QueryService,
}

impl Engine {
    /// Create a new engine builder.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Build an engine entirely from configuration.
    pub async fn from_config(config: VdbConfig) -> Result<Self> {
        EngineBuilder::new().with_config(config).build().await
    }

    /// Ingest raw text under `key`.
    pub async fn ingest(&self, key: &str, text: &str) -> Result<Record> {
        self.ingestion.ingest(key, text).await
    }

    /// Ingest a document from disk.
    pub async fn ingest_file(&self, path: impl AsRef<Path>, key: Option<&str>) -> Result<Record> {
        self.ingestion.ingest_file(path, key).await
    }

    /// Ingest the captions of a YouTube video.
    ///
    /// An empty `languages` list uses the configured caption languages.
    pub async fn ingest_video(&self, url: &str, languages: &[String]) -> Result<Record> {
        let policy = self.config.captions.policy(languages);
        self.ingestion.ingest_video(url, &policy).await
    }

    /// Search for the records most similar to `text`.
    pub async fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<ScoredRecord>> {
        self.queries.query(text, k).await
    }

    /// Get the record stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Record> {
        Ok(self.store.get(key).await?)
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    /// The configuration the engine was built with.
    pub fn config(&self) -> &VdbConfig {
        &self.config
    }

    /// Get engine statistics.
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            records: self.store.len().await,
            dimension: self.store.dimension().await,
            provider: self.provider.name().to_string(),
            persistent: self.store.path().is_some(),
        }
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: VdbConfig,
    store: Option<EmbeddingStore>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    ranker: Option<Arc<dyn Ranker>>,
    captions: Option<Arc<dyn CaptionSource>>,
}

impl EngineBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: VdbConfig::default(),
            store: None,
            provider: None,
            ranker: None,
            captions: None,
        }
    }

    /// Use `config` for everything not injected explicitly.
    pub fn with_config(mut self, config: VdbConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an already opened store instead of `store.path`.
    pub fn with_store(mut self, store: EmbeddingStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom vectorizer.
    pub fn with_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Use a custom ranker.
    pub fn with_ranker(mut self, ranker: Arc<dyn Ranker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Use a custom caption source.
    pub fn with_caption_source(mut self, captions: Arc<dyn CaptionSource>) -> Self {
        self.captions = Some(captions);
        self
    }

    /// Build the engine.
    pub async fn build(self) -> Result<Engine> {
        let config = self.config;

        let provider = match self.provider {
            Some(provider) => provider,
            None => build_provider(&config.embedding).await?,
        };
        if !provider.is_available() {
            warn!("Embedding provider {} is not available", provider.name());
        }

        let store = match self.store {
            Some(store) => store,
            None => EmbeddingStore::open(&config.store.path).await?,
        };
        // Without a known dimension the first upsert fixes it.
        let store = match provider.known_dimension() {
            Some(dimension) => store.with_dimension(dimension).map_err(|err| match err {
                StoreError::DimensionMismatch { expected, actual } => {
                    RetrievalError::Config(format!(
                        "store holds {expected}-dimensional vectors but {} produces {actual}",
                        provider.name()
                    ))
                }
                other => other.into(),
            })?,
            None => store,
        };
        let store = Arc::new(store);

        let ranker: Arc<dyn Ranker> = match self.ranker {
            Some(ranker) => ranker,
            None => match config.query.min_score {
                Some(min_score) => Arc::new(BruteForceRanker::new().with_min_score(min_score)),
                None => Arc::new(BruteForceRanker::new()),
            },
        };

        let captions: Arc<dyn CaptionSource> = match self.captions {
            Some(captions) => captions,
            None => Arc::new(
                YouTubeCaptionSource::new().with_timeout(config.captions.timeout())?,
            ),
        };

        let ingestion =
            IngestionPipeline::new(Arc::clone(&store), Arc::clone(&provider), captions);
        let queries = QueryService::new(Arc::clone(&store), Arc::clone(&provider), ranker)
            .with_limits(&config.query);

        info!(
            "Engine ready: {} records, provider {} ({} dims)",
            store.len().await,
            provider.name(),
            store
                .dimension()
                .await
                .map_or_else(|| "unknown".to_string(), |d| d.to_string())
        );

        Ok(Engine {
            config,
            store,
            provider,
            ingestion,
            queries,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

async fn build_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider {
        EmbeddingProviderType::FastEmbed => {
            let model = config.model.clone();
            let cache_dir = config.model_cache_dir();
            // Loading may download model files.
            let provider = tokio::task::spawn_blocking(move || {
                FastEmbedProvider::load(model.as_deref(), cache_dir)
            })
            .await
            .map_err(|e| RetrievalError::Config(format!("local model loader failed: {e}")))?
            .map_err(|e| RetrievalError::Config(e.to_string()))?;

            let native = provider.default_dimension();
            if let Some(dimension) = config.dimension.filter(|d| *d != native) {
                return Err(RetrievalError::Config(format!(
                    "embedding.dimension is {dimension} but {} produces {native}",
                    provider.model()
                )));
            }
            Ok(Arc::new(provider))
        }
        EmbeddingProviderType::OpenAI => {
            let mut provider = match config.api_key {
                Some(ref key) => OpenAIProvider::new().with_api_key(key),
                None => OpenAIProvider::new().with_api_key_env(&config.api_key_env),
            }
            .with_timeout(config.timeout())?;
            if let Some(ref url) = config.base_url {
                provider = provider.with_base_url(url);
            }
            if let Some(ref model) = config.model {
                provider = provider.with_model(model);
            }
            if let Some(dimension) = config.dimension {
                provider = provider.with_dimensions(dimension);
            }
            Ok(Arc::new(provider))
        }
    }
}

/// Statistics about the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Number of stored records.
    pub records: usize,

    /// Vector dimension, once fixed.
    pub dimension: Option<usize>,

    /// Name of the vectorizer.
    pub provider: String,

    /// Whether records are persisted to disk.
    pub persistent: bool,
}

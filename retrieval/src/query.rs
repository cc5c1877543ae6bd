//! Read path: query text -> vectorizer -> ranker over the stored records.

use std::sync::Arc;

use tracing::debug;
use vdb_embeddings::{EmbeddingProvider, EmbeddingStore, Ranker, ScoredRecord};

use crate::config::QueryConfig;
use crate::error::{Result, RetrievalError};
use crate::ingest::normalize_text;

/// Answers nearest-neighbour queries over an [`EmbeddingStore`].
pub struct QueryService {
    store: Arc<EmbeddingStore>,
    provider: Arc<dyn EmbeddingProvider>,
    ranker: Arc<dyn Ranker>,
    default_k: usize,
    max_results: usize,
}

impl QueryService {
    /// Create a query service with the default limits.
    pub fn new(
        store: Arc<EmbeddingStore>,
        provider: Arc<dyn EmbeddingProvider>,
        ranker: Arc<dyn Ranker>,
    ) -> Self {
        let limits = QueryConfig::default();
        Self {
            store,
            provider,
            ranker,
            default_k: limits.default_k,
            max_results: limits.max_results,
        }
    }

    /// Apply the limits of a query configuration.
    pub fn with_limits(mut self, config: &QueryConfig) -> Self {
        self.default_k = config.default_k;
        self.max_results = config.max_results;
        self
    }

    /// Number of results returned when the caller does not pass `k`.
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Return the `k` stored records most similar to `text`, best first.
    ///
    /// `k` defaults to the configured `default_k` and is capped at
    /// `max_results`.
    pub async fn query(&self, text: &str, k: Option<usize>) -> Result<Vec<ScoredRecord>> {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }

        let k = k.unwrap_or(self.default_k).min(self.max_results);
        if k == 0 || self.store.is_empty().await {
            return Ok(Vec::new());
        }

        let query_vector = self.provider.embed_text(&normalized).await?;

        let candidates = self.store.scan_all().await;
        if let Some(expected) = self.store.dimension().await {
            if query_vector.len() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let results = self.ranker.rank(&query_vector, &candidates, k);
        debug!(
            "Query matched {} of {} records (k = {k})",
            results.len(),
            candidates.len()
        );
        Ok(results)
    }
}

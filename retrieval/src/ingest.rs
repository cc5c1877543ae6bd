//! Write path: source text -> vectorizer -> store.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vdb_embeddings::{EmbeddingProvider, EmbeddingStore, Record};
use vdb_sources::{CaptionSource, LanguagePolicy, extract_file, video_id_from_url};

use crate::error::{Result, RetrievalError};

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Turns source text into stored records.
pub struct IngestionPipeline {
    store: Arc<EmbeddingStore>,
    provider: Arc<dyn EmbeddingProvider>,
    captions: Arc<dyn CaptionSource>,
}

impl IngestionPipeline {
    /// Create a pipeline writing to `store`.
    pub fn new(
        store: Arc<EmbeddingStore>,
        provider: Arc<dyn EmbeddingProvider>,
        captions: Arc<dyn CaptionSource>,
    ) -> Self {
        Self {
            store,
            provider,
            captions,
        }
    }

    /// Vectorize `raw_text` and store it under `key`, replacing any previous
    /// record for the key.
    ///
    /// Nothing is written unless every step succeeds.
    pub async fn ingest(&self, key: &str, raw_text: &str) -> Result<Record> {
        if key.is_empty() {
            return Err(RetrievalError::EmptyKey);
        }
        let normalized = normalize_text(raw_text);
        if normalized.is_empty() {
            return Err(RetrievalError::EmptyText);
        }

        let vector = self.provider.embed_text(&normalized).await?;
        let record = Record {
            key: key.to_string(),
            text: raw_text.trim().to_string(),
            vector,
        };

        self.store
            .upsert(record.key.clone(), record.text.clone(), record.vector.clone())
            .await?;

        debug!(
            "Ingested {key} ({} chars, {} dims)",
            record.text.len(),
            record.vector.len()
        );
        Ok(record)
    }

    /// Extract the text of a document and ingest it.
    ///
    /// The key defaults to the file stem.
    pub async fn ingest_file(&self, path: impl AsRef<Path>, key: Option<&str>) -> Result<Record> {
        let path = path.as_ref();
        let key = match key {
            Some(key) => key.to_string(),
            None => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
        };

        let text = extract_file(path).await?;
        let record = self.ingest(&key, &text).await?;
        info!("Ingested file {} as {key}", path.display());
        Ok(record)
    }

    /// Fetch the captions of a YouTube video and ingest them under the video
    /// id.
    pub async fn ingest_video(&self, url: &str, policy: &LanguagePolicy) -> Result<Record> {
        let video_id = video_id_from_url(url)?;
        let captions = self.captions.fetch_captions(&video_id, policy).await?;
        let record = self.ingest(&video_id, &captions).await?;
        info!("Stored captions for video {video_id}");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use vdb_embeddings::testing::HashingProvider;
    use vdb_embeddings::{EmbeddingError, EmbeddingRequest, EmbeddingResponse};
    use vdb_sources::CaptionError;

    /// Counts calls and optionally fails.
    struct CountingProvider {
        inner: HashingProvider,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                inner: HashingProvider::new(16),
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "counting"
        }

        fn default_dimension(&self) -> usize {
            16
        }

        async fn embed(
            &self,
            request: EmbeddingRequest,
        ) -> vdb_embeddings::Result<EmbeddingResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EmbeddingError::ApiRequest("model offline".to_string()));
            }
            self.inner.embed(request).await
        }

        fn is_available(&self) -> bool {
            !self.fail
        }
    }

    struct FixedCaptions(std::result::Result<String, String>);

    #[async_trait]
    impl CaptionSource for FixedCaptions {
        async fn fetch_captions(
            &self,
            _video_id: &str,
            _policy: &LanguagePolicy,
        ) -> std::result::Result<String, CaptionError> {
            self.0.clone().map_err(CaptionError::NoCaptions)
        }
    }

    fn pipeline(
        provider: Arc<CountingProvider>,
        captions: std::result::Result<String, String>,
    ) -> (IngestionPipeline, Arc<EmbeddingStore>) {
        let store = Arc::new(EmbeddingStore::in_memory());
        let pipeline = IngestionPipeline::new(
            Arc::clone(&store),
            provider,
            Arc::new(FixedCaptions(captions)),
        );
        (pipeline, store)
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  cats\n\tare   great \r\n"), "cats are great");
        assert_eq!(normalize_text(" \n\t "), "");
    }

    #[tokio::test]
    async fn test_ingest_stores_trimmed_text() {
        let provider = Arc::new(CountingProvider::new(false));
        let (pipeline, store) = pipeline(Arc::clone(&provider), Ok(String::new()));

        let record = pipeline.ingest("v1", "  cats are\n great  ").await.unwrap();
        assert_eq!(record.text, "cats are\n great");
        assert_eq!(record.vector, provider.inner.embed_sync("cats are great"));
        assert_eq!(store.get("v1").await.unwrap(), record);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_text_is_rejected_before_vectorizing() {
        let provider = Arc::new(CountingProvider::new(false));
        let (pipeline, store) = pipeline(Arc::clone(&provider), Ok(String::new()));

        for text in ["", "   \n\t"] {
            let err = pipeline.ingest("v3", text).await.unwrap_err();
            assert!(matches!(err, RetrievalError::EmptyText));
        }
        let err = pipeline.ingest("", "text").await.unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyKey));

        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_vectorizer_failure_leaves_store_untouched() {
        let provider = Arc::new(CountingProvider::new(true));
        let (pipeline, store) = pipeline(Arc::clone(&provider), Ok(String::new()));

        let err = pipeline.ingest("v1", "cats").await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::VectorizationFailed);
        assert!(!store.contains("v1").await);
    }

    #[tokio::test]
    async fn test_ingest_file_uses_stem_as_key() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        std::fs::write(&path, "cats are great").unwrap();

        let (pipeline, store) = pipeline(Arc::new(CountingProvider::new(false)), Ok(String::new()));
        pipeline.ingest_file(&path, None).await.unwrap();
        pipeline.ingest_file(&path, Some("custom")).await.unwrap();

        assert_eq!(store.keys().await, vec!["custom".to_string(), "notes".to_string()]);

        let err = pipeline
            .ingest_file(temp_dir.path().join("slides.pptx"), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::ExtractionError);
    }

    #[tokio::test]
    async fn test_ingest_video_keys_by_video_id() {
        let (pipeline, store) = pipeline(
            Arc::new(CountingProvider::new(false)),
            Ok("never gonna give you up".to_string()),
        );

        let record = pipeline
            .ingest_video("https://youtu.be/dQw4w9WgXcQ", &LanguagePolicy::default())
            .await
            .unwrap();
        assert_eq!(record.key, "dQw4w9WgXcQ");
        assert!(store.contains("dQw4w9WgXcQ").await);

        let err = pipeline
            .ingest_video("https://example.com/video", &LanguagePolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidUrl);
    }

    #[tokio::test]
    async fn test_missing_captions_store_nothing() {
        let (pipeline, store) = pipeline(
            Arc::new(CountingProvider::new(false)),
            Err("captions disabled".to_string()),
        );

        let err = pipeline
            .ingest_video("https://www.youtube.com/watch?v=abc", &LanguagePolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NoCaptions);
        assert!(store.is_empty().await);
    }
}

//! Local sentence embeddings with fastembed.
//!
//! The ONNX model is owned by a dedicated worker thread. Requests reach it
//! through a channel and answers come back on a oneshot, so inference never
//! runs on the async runtime and no lock is held around the model.

use std::path::PathBuf;
use std::thread;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};

/// Output dimension of the default model, all-MiniLM-L6-v2.
pub const FASTEMBED_DIMENSION: usize = 384;

/// Requests waiting for the model before senders are back-pressured.
const QUEUE_DEPTH: usize = 64;

struct EmbedJob {
    texts: Vec<String>,
    reply: oneshot::Sender<Result<Vec<Embedding>>>,
}

/// Embedding provider running a sentence-transformer model locally.
pub struct FastEmbedProvider {
    sender: mpsc::Sender<EmbedJob>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Load the default model (all-MiniLM-L6-v2).
    ///
    /// Model files are downloaded on first use, so this blocks; call it from
    /// `spawn_blocking` inside async code.
    pub fn new() -> Result<Self> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Load the model called `name`, caching its files under `cache_dir`.
    pub fn load(name: Option<&str>, cache_dir: Option<PathBuf>) -> Result<Self> {
        let model = match name {
            Some(name) => parse_model(name)?,
            None => EmbeddingModel::AllMiniLML6V2,
        };
        let mut options = InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }
        Self::with_options(options)
    }

    /// Load a specific model.
    pub fn with_model(model: EmbeddingModel) -> Result<Self> {
        Self::with_options(InitOptions::new(model).with_show_download_progress(false))
    }

    /// Load a model with custom initialization options.
    pub fn with_options(options: InitOptions) -> Result<Self> {
        let model_name = format!("{:?}", options.model_name);
        let dimension = TextEmbedding::get_model_info(&options.model_name)
            .map(|info| info.dim)
            .map_err(model_unavailable)?;
        let model = TextEmbedding::try_new(options).map_err(model_unavailable)?;

        let (sender, jobs) = mpsc::channel(QUEUE_DEPTH);
        thread::Builder::new()
            .name("vdb-fastembed".to_string())
            .spawn(move || run_model(model, jobs))
            .map_err(model_unavailable)?;

        info!("Loaded local embedding model {model_name} ({dimension} dims)");
        Ok(Self {
            sender,
            model_name,
            dimension,
        })
    }

    /// Name of the loaded model.
    pub fn model(&self) -> &str {
        &self.model_name
    }

    async fn run(&self, texts: Vec<String>) -> Result<Vec<Embedding>> {
        let expected = texts.len();
        let (reply, response) = oneshot::channel();
        self.sender
            .send(EmbedJob { texts, reply })
            .await
            .map_err(|_| model_stopped())?;

        let vectors = response.await.map_err(|_| model_stopped())??;
        if vectors.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    fn name(&self) -> &str {
        "fastembed"
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }

    fn default_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        if let Some(expected) = request.dimensions.filter(|d| *d != self.dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: self.dimension,
            });
        }

        let embedding = self
            .run(vec![request.text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding returned".to_string()))?;

        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.model_name.clone(),
            tokens_used: None,
        })
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let texts = requests.into_iter().map(|r| r.text).collect();
        let vectors = self.run(texts).await?;
        debug!("Generated {} local embeddings", vectors.len());

        Ok(vectors
            .into_iter()
            .map(|embedding| EmbeddingResponse {
                dimension: embedding.len(),
                embedding,
                model: self.model_name.clone(),
                tokens_used: None,
            })
            .collect())
    }

    fn is_available(&self) -> bool {
        !self.sender.is_closed()
    }
}

fn run_model(mut model: TextEmbedding, mut jobs: mpsc::Receiver<EmbedJob>) {
    while let Some(job) = jobs.blocking_recv() {
        let result = model
            .embed(job.texts, None)
            .map_err(|e| EmbeddingError::ApiRequest(format!("local model failed: {e}")));
        // The caller may have stopped waiting.
        let _ = job.reply.send(result);
    }
    debug!("Local embedding model stopped");
}

/// Map a configured model name to a fastembed model.
///
/// Accepts Hugging Face ids (`sentence-transformers/all-MiniLM-L6-v2`,
/// `BAAI/bge-small-en-v1.5`) and fastembed variant names, ignoring case and
/// punctuation.
pub fn parse_model(name: &str) -> Result<EmbeddingModel> {
    let short = name.rsplit('/').next().unwrap_or(name);
    let normalized: String = short
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match normalized.as_str() {
        "allminilml6v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "allminilml12v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "bgesmallenv15" => Ok(EmbeddingModel::BGESmallENV15),
        "bgebaseenv15" => Ok(EmbeddingModel::BGEBaseENV15),
        "bgelargeenv15" => Ok(EmbeddingModel::BGELargeENV15),
        "multilinguale5small" => Ok(EmbeddingModel::MultilingualE5Small),
        "multilinguale5base" => Ok(EmbeddingModel::MultilingualE5Base),
        "multilinguale5large" => Ok(EmbeddingModel::MultilingualE5Large),
        _ => Err(EmbeddingError::ModelUnavailable(format!(
            "unknown local model: {name}"
        ))),
    }
}

fn model_unavailable(err: impl std::fmt::Display) -> EmbeddingError {
    EmbeddingError::ModelUnavailable(err.to_string())
}

fn model_stopped() -> EmbeddingError {
    EmbeddingError::ModelUnavailable("local model worker stopped".to_string())
}

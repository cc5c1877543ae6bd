//! Embedding providers.
//!
//! A provider is the vectorizer: a deterministic function from text to a
//! fixed-length vector. The OpenAI-compatible HTTP client lives here; the
//! local model is in [`crate::local`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,

    /// Dimensions for the output (if supported by provider).
    pub dimensions: Option<usize>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            dimensions: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the output dimensions.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Dimension of the embedding.
    pub dimension: usize,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the default embedding dimension.
    fn default_dimension(&self) -> usize;

    /// The output dimension when it is certain rather than inferred from a
    /// model name. Stores are only pinned to a known dimension.
    fn known_dimension(&self) -> Option<usize> {
        Some(self.default_dimension())
    }

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        // Default implementation: process sequentially
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.embed(request).await?);
        }
        Ok(results)
    }

    /// Embed a single text with the provider defaults and return the vector.
    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed(EmbeddingRequest::new(text)).await?.embedding)
    }

    /// Check if the provider is available (API key set, etc.).
    fn is_available(&self) -> bool;
}

/// OpenAI embedding provider.
///
/// Works with any server exposing the OpenAI `/embeddings` endpoint.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    default_model: String,

    /// Output dimension requested from the API, if not the model's native one.
    dimensions: Option<usize>,

    /// Longest input accepted, in characters.
    max_input_chars: usize,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider reading the key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            default_model: "text-embedding-3-small".to_string(),
            dimensions: None,
            // Roughly the 8k token input limit.
            max_input_chars: 32_000,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read the API key from another environment variable.
    pub fn with_api_key_env(mut self, var: &str) -> Self {
        self.api_key = std::env::var(var).ok();
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Ask the API for shortened vectors of `dimensions` components.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(self)
    }

    async fn post_embeddings(&self, body: serde_json::Value) -> Result<OpenAIEmbeddingResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        Ok(response.json().await?)
    }

    fn check_length(&self, text: &str) -> Result<()> {
        let length = text.chars().count();
        if length > self.max_input_chars {
            return Err(EmbeddingError::TextTooLong {
                length,
                max_length: self.max_input_chars,
            });
        }
        Ok(())
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn default_dimension(&self) -> usize {
        self.dimensions
            .unwrap_or(match self.default_model.as_str() {
                "text-embedding-3-large" => 3072,
                _ => 1536,
            })
    }

    fn known_dimension(&self) -> Option<usize> {
        self.dimensions
    }

    async fn embed(&self, mut request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.check_length(&request.text)?;
        request.dimensions = request.dimensions.or(self.dimensions);
        let model = request.model.unwrap_or_else(|| self.default_model.clone());

        debug!("Generating embedding with model: {model}");

        let mut body = serde_json::json!({
            "input": request.text,
            "model": model
        });
        if let Some(dims) = request.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }

        let result = self.post_embeddings(body).await?;

        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .embedding;

        let dimension = embedding.len();
        if let Some(expected) = request.dimensions.filter(|d| *d != dimension) {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: dimension,
            });
        }

        debug!("Generated embedding with {dimension} dimensions");

        Ok(EmbeddingResponse {
            embedding,
            model: result.model,
            dimension,
            tokens_used: result.usage.map(|u| u.total_tokens),
        })
    }

    async fn embed_batch(&self, requests: Vec<EmbeddingRequest>) -> Result<Vec<EmbeddingResponse>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        for request in &requests {
            self.check_length(&request.text)?;
        }

        let model = requests[0]
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let texts: Vec<&str> = requests.iter().map(|r| r.text.as_str()).collect();

        debug!(
            "Generating batch embeddings for {} texts with model: {model}",
            texts.len()
        );

        let mut body = serde_json::json!({
            "input": texts,
            "model": model
        });
        if let Some(dims) = self.dimensions {
            body["dimensions"] = serde_json::json!(dims);
        }
        let result = self.post_embeddings(body).await?;

        if result.data.len() != requests.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                requests.len(),
                result.data.len()
            )));
        }

        let mut data = result.data;
        data.sort_by_key(|item| item.index);

        let responses: Vec<EmbeddingResponse> = data
            .into_iter()
            .map(|item| {
                let dimension = item.embedding.len();
                EmbeddingResponse {
                    embedding: item.embedding,
                    model: result.model.clone(),
                    dimension,
                    tokens_used: None,
                }
            })
            .collect();

        info!("Generated {} batch embeddings", responses.len());

        Ok(responses)
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

//! Test doubles for code built on [`EmbeddingProvider`].
//!
//! Compiled for this crate's tests and for dependents that enable the
//! `test-util` feature.

use async_trait::async_trait;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, EmbeddingRequest, EmbeddingResponse};
use crate::similarity::normalize;

/// Default dimension of the hashing provider.
pub const HASHING_DIMENSION: usize = 384;

/// Deterministic stand-in for a real vectorizer.
///
/// Lowercased alphanumeric tokens and adjacent token pairs are hashed into
/// a fixed number of signed buckets and the result is L2-normalized. Only
/// lexical overlap is captured, so it is for tests, not retrieval.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    dimension: usize,
}

impl HashingProvider {
    /// Create a hashing provider with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Compute the embedding synchronously.
    pub fn embed_sync(&self, text: &str) -> Embedding {
        let mut embedding = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = tokenize(text).collect();

        for token in &tokens {
            self.accumulate(&mut embedding, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut embedding, bigram.as_bytes(), 0.5);
        }

        normalize(&mut embedding);
        embedding
    }

    fn accumulate(&self, embedding: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        embedding[bucket] += sign * weight;
    }
}

impl Default for HashingProvider {
    fn default() -> Self {
        Self::new(HASHING_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    fn default_model(&self) -> &str {
        "feature-hashing"
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

        let embedding = self.embed_sync(&request.text);
        Ok(EmbeddingResponse {
            dimension: embedding.len(),
            embedding,
            model: self.default_model().to_string(),
            tokens_used: Some(tokenize(&request.text).count() as u64),
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// 64-bit FNV-1a; stable across platforms and releases, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

//! Ranking of stored records against a query vector.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::similarity::cosine_similarity;
use crate::store::Record;

/// A ranked match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    /// Key of the matched record.
    pub key: String,

    /// Text of the matched record.
    pub text: String,

    /// Cosine similarity, or negative infinity when it is undefined.
    pub score: f32,
}

impl ScoredRecord {
    /// The score if it is a real similarity value.
    pub fn similarity(&self) -> Option<f32> {
        self.score.is_finite().then_some(self.score)
    }
}

/// Orders candidates against a query vector.
///
/// Implementations must return at most `k` results, sorted by descending
/// score with ties broken by ascending key, and must never fail on
/// degenerate vectors.
pub trait Ranker: Send + Sync {
    /// Rank `candidates` against `query` and keep the top `k`.
    fn rank(&self, query: &[f32], candidates: &[Record], k: usize) -> Vec<ScoredRecord>;
}

/// Exhaustive ranker: scores every candidate and sorts.
#[derive(Debug, Clone, Default)]
pub struct BruteForceRanker {
    min_score: Option<f32>,
}

impl BruteForceRanker {
    /// Create a ranker that keeps every candidate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop candidates scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// Score used when the cosine similarity is undefined.
pub fn score(query: &[f32], candidate: &[f32]) -> f32 {
    cosine_similarity(query, candidate).unwrap_or(f32::NEG_INFINITY)
}

fn by_score_then_key(
    a: &(OrderedFloat<f32>, &Record),
    b: &(OrderedFloat<f32>, &Record),
) -> Ordering {
    b.0.cmp(&a.0).then_with(|| a.1.key.cmp(&b.1.key))
}

impl Ranker for BruteForceRanker {
    fn rank(&self, query: &[f32], candidates: &[Record], k: usize) -> Vec<ScoredRecord> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(OrderedFloat<f32>, &Record)> = candidates
            .iter()
            .map(|record| (OrderedFloat(score(query, &record.vector)), record))
            .filter(|(score, _)| self.min_score.is_none_or(|min| score.0 >= min))
            .collect();

        scored.sort_by(by_score_then_key);

        scored
            .into_iter()
            .take(k)
            .map(|(score, record)| ScoredRecord {
                key: record.key.clone(),
                text: record.text.clone(),
                score: score.0,
            })
            .collect()
    }
}

//! Vector math shared by the ranker and the providers.

/// Compute the dot product of two equal-length vectors.
///
/// Returns `None` when the lengths differ.
pub fn dot_product(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Euclidean norm of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute the cosine similarity between two embeddings.
///
/// Returns a value between -1.0 and 1.0, where:
/// - 1.0 means identical direction
/// - 0.0 means orthogonal vectors
/// - -1.0 means opposite vectors
///
/// The similarity is undefined, and `None` is returned, when the lengths
/// differ, when either vector has zero norm, or when the inputs contain
/// non-finite values.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let dot = dot_product(a, b)?;
    let magnitude_a = magnitude(a);
    let magnitude_b = magnitude(b);

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return None;
    }

    let score = dot / (magnitude_a * magnitude_b);
    // Rounding can push parallel vectors slightly past the unit interval.
    score.is_finite().then_some(score.clamp(-1.0, 1.0))
}

/// Normalize an embedding to unit length. Zero vectors are left untouched.
pub fn normalize(embedding: &mut [f32]) {
    let magnitude = magnitude(embedding);
    if magnitude > 0.0 {
        for x in embedding.iter_mut() {
            *x /= magnitude;
        }
    }
}

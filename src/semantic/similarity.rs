//! Cosine similarity between embedding vectors.

/// Vectors of different model provenance were compared. Programmer
/// error; fail fast instead of silently truncating.
#[derive(Debug, thiserror::Error)]
pub enum SimilarityError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Cosine similarity between two vectors, in [-1.0, 1.0].
///
/// A zero vector carries no semantic signal, so similarity against one
/// is defined as 0.0 rather than propagating NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, SimilarityError> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }

    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }

    let denominator = a_norm.sqrt() * b_norm.sqrt();
    if denominator < f32::EPSILON {
        return Ok(0.0);
    }

    Ok(dot / denominator)
}

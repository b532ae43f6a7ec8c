//! Corpus ranking against a multi-term query.

use crate::semantic::encoder::{EncoderError, TextEncoder};
use crate::semantic::query::expand_query;
use crate::semantic::similarity::{cosine_similarity, SimilarityError};

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    /// Not a true failure: callers conventionally treat this as
    /// "show the full corpus".
    #[error("query produced no search terms")]
    EmptyQuery,

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),
}

/// A corpus item together with its best similarity score.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub item: T,
    pub score: f32,
}

/// Rank a corpus of texts against a query.
///
/// The query may contain "or" disjunctions; each corpus item is scored
/// by its best similarity to any single term. Items scoring below
/// `threshold` are dropped, the rest are sorted by descending score
/// with ties kept in corpus order.
pub fn semantic_search(
    encoder: &dyn TextEncoder,
    corpus: &[String],
    query: &str,
    threshold: f32,
) -> Result<Vec<Scored<String>>, RankError> {
    let terms = expand_query(query);
    if terms.is_empty() {
        return Err(RankError::EmptyQuery);
    }

    let query_vectors = encoder.encode_batch(&terms)?;
    let corpus_vectors = encoder.encode_batch(corpus)?;

    let mut results = Vec::new();
    for (text, vector) in corpus.iter().zip(corpus_vectors.iter()) {
        let score = best_score(&query_vectors, vector)?;
        if score >= threshold {
            results.push(Scored {
                item: text.clone(),
                score,
            });
        }
    }

    // sort_by is stable, equal scores keep corpus order
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(results)
}

/// Best similarity between `target` and any one query-term vector.
/// Realizes OR semantics across terms.
pub(crate) fn best_score(
    query_vectors: &[Vec<f32>],
    target: &[f32],
) -> Result<f32, SimilarityError> {
    let mut best = -1.0f32;
    for query_vector in query_vectors {
        let score = cosine_similarity(query_vector, target)?;
        if score > best {
            best = score;
        }
    }
    Ok(best)
}

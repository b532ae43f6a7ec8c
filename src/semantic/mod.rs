//! Semantic search infrastructure for post ranking.
//!
//! This module embeds free-text posts and search queries into
//! fixed-length vectors using a pretrained sentence-embedding model,
//! then ranks posts by cosine similarity to the query.
//!
//! # Architecture
//!
//! - `encoder`: Wraps fastembed for embedding generation
//! - `loader`: Lazy, memoized model loading shared across callers
//! - `similarity`: Cosine similarity between embedding vectors
//! - `query`: Splits "a or b" queries into independent terms
//! - `ranker`: Scores a corpus of texts against a multi-term query
//! - `session`: Per-session post embeddings with stale-batch guarding
//! - `fallback`: Substring matching used while the model is unavailable

pub mod encoder;
pub mod fallback;
pub mod loader;
pub mod query;
pub mod ranker;
pub mod session;
pub mod similarity;
#[cfg(test)]
pub mod testutil;

pub use encoder::{EncoderError, FastembedEncoder, TextEncoder};
pub use loader::ModelLoader;
pub use ranker::{semantic_search, RankError, Scored};
pub use session::{SearchError, SearchSession};
pub use similarity::{cosine_similarity, SimilarityError};

/// Default embedding model (small and quick to download, good enough for short posts)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Default similarity threshold for one-shot corpus ranking
pub const DEFAULT_RANK_THRESHOLD: f32 = 0.75;

/// Stricter threshold used when ranking against precomputed session embeddings
pub const DEFAULT_SESSION_THRESHOLD: f32 = 0.8;

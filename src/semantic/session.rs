//! Per-session post embeddings and the search path built on them.
//!
//! Post embeddings are recomputed as a batch whenever the post list
//! changes, so a query only costs one query-term embedding instead of a
//! full corpus re-embed. Recomputation is guarded by a generation
//! counter: a batch started against a post list that has since changed
//! is discarded instead of overwriting fresher results.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::SemanticSearchConfig;
use crate::posts::Post;
use crate::semantic::encoder::{EncoderError, TextEncoder};
use crate::semantic::loader::ModelLoader;
use crate::semantic::query::expand_query;
use crate::semantic::ranker::{best_score, RankError, Scored};
use crate::semantic::similarity::SimilarityError;

/// Maximum embedding input length (characters, not tokens)
const MAX_CONTENT_LENGTH: usize = 512;

/// Ellipsis suffix when content is truncated
const TRUNCATION_SUFFIX: &str = "...";

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("semantic search is disabled")]
    Disabled,

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error(transparent)]
    Rank(#[from] RankError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Default)]
struct SessionIndex {
    generation: u64,
    /// Post id -> embedding of the post's session text
    vectors: HashMap<u64, Vec<f32>>,
}

/// Session-scoped semantic search over posts.
///
/// Holds the lazily loaded model and the current batch of post
/// embeddings. Thread-safe; vectors are immutable once stored.
pub struct SearchSession {
    loader: Arc<ModelLoader>,
    config: SemanticSearchConfig,
    index: Mutex<SessionIndex>,
    generation: AtomicU64,
}

impl SearchSession {
    pub fn new(loader: Arc<ModelLoader>, config: SemanticSearchConfig) -> Self {
        Self {
            loader,
            config,
            index: Mutex::new(SessionIndex::default()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether the semantic path can serve searches.
    pub fn is_ready(&self) -> bool {
        self.config.enabled && self.loader.is_ready()
    }

    /// Number of posts with a session embedding.
    pub fn indexed_count(&self) -> usize {
        self.index.lock().unwrap().vectors.len()
    }

    /// Start a new embedding batch, superseding any batch still in
    /// flight.
    fn begin_refresh(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a computed batch unless a newer one has been started or
    /// stored since. Returns whether the batch was applied.
    fn commit(&self, token: u64, vectors: HashMap<u64, Vec<f32>>) -> bool {
        if token != self.generation.load(Ordering::SeqCst) {
            log::debug!("discarding superseded embedding batch (generation {token})");
            return false;
        }

        let mut index = self.index.lock().unwrap();
        if token < index.generation {
            return false;
        }

        index.generation = token;
        index.vectors = vectors;
        true
    }

    /// Recompute session embeddings for the given post list.
    ///
    /// Triggers the model load on first call. Returns `Ok(false)` if
    /// the batch was superseded by a newer refresh while the embeddings
    /// were being computed.
    pub async fn refresh_embeddings(&self, posts: &[Post]) -> Result<bool, SearchError> {
        if !self.config.enabled {
            return Err(SearchError::Disabled);
        }

        let token = self.begin_refresh();

        let ids: Vec<u64> = posts.iter().map(|post| post.id).collect();
        let texts: Vec<String> = posts.iter().map(embedding_text).collect();

        let encoder = self.loader.get().await?;
        let vectors = tokio::task::spawn_blocking(move || encoder.encode_batch(&texts))
            .await
            .map_err(|err| SearchError::Internal(err.to_string()))??;

        let vectors: HashMap<u64, Vec<f32>> = ids.into_iter().zip(vectors).collect();
        Ok(self.commit(token, vectors))
    }

    /// Rank posts against the query using the precomputed session
    /// embeddings.
    ///
    /// Posts created since the last refresh have no embedding yet and
    /// are skipped until the next refresh commits. Results are filtered
    /// at strictly greater than `threshold` (the configured session
    /// threshold if `None`) and sorted by descending score, ties in
    /// corpus order.
    pub async fn rank(
        &self,
        posts: &[Post],
        query: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<Post>, SearchError> {
        if !self.config.enabled {
            return Err(SearchError::Disabled);
        }

        let terms = expand_query(query);
        if terms.is_empty() {
            return Err(SearchError::Rank(RankError::EmptyQuery));
        }

        let encoder = self.loader.get().await?;
        let query_vectors = tokio::task::spawn_blocking(move || encoder.encode_batch(&terms))
            .await
            .map_err(|err| SearchError::Internal(err.to_string()))??;

        let threshold = threshold.unwrap_or(self.config.session_threshold);

        let mut results: Vec<Scored<Post>> = Vec::new();
        {
            let index = self.index.lock().unwrap();
            for post in posts {
                let Some(vector) = index.vectors.get(&post.id) else {
                    continue;
                };
                let score = best_score(&query_vectors, vector)?;
                if score > threshold {
                    results.push(Scored {
                        item: post.clone(),
                        score,
                    });
                }
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results.into_iter().map(|scored| scored.item).collect())
    }

    /// One-shot ranking that embeds the posts fresh for this query
    /// instead of reading the session index, so brand-new posts are
    /// visible immediately. Filters at `score >= threshold`.
    pub async fn rank_fresh(
        &self,
        posts: &[Post],
        query: &str,
        threshold: f32,
    ) -> Result<Vec<Post>, SearchError> {
        if !self.config.enabled {
            return Err(SearchError::Disabled);
        }

        let terms = expand_query(query);
        if terms.is_empty() {
            return Err(SearchError::Rank(RankError::EmptyQuery));
        }

        let encoder = self.loader.get().await?;
        let texts: Vec<String> = posts.iter().map(embedding_text).collect();

        let (query_vectors, corpus_vectors) = tokio::task::spawn_blocking(move || {
            let query_vectors = encoder.encode_batch(&terms)?;
            let corpus_vectors = encoder.encode_batch(&texts)?;
            Ok::<_, EncoderError>((query_vectors, corpus_vectors))
        })
        .await
        .map_err(|err| SearchError::Internal(err.to_string()))??;

        let mut results: Vec<Scored<Post>> = Vec::new();
        for (post, vector) in posts.iter().zip(corpus_vectors.iter()) {
            let score = best_score(&query_vectors, vector)?;
            if score >= threshold {
                results.push(Scored {
                    item: post.clone(),
                    score,
                });
            }
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(results.into_iter().map(|scored| scored.item).collect())
    }
}

/// Text handed to the embedding model for one post.
fn embedding_text(post: &Post) -> String {
    let content = format!("{}: {}", post.username, post.post_text);
    if content.len() <= MAX_CONTENT_LENGTH {
        return content;
    }

    let max_chars = MAX_CONTENT_LENGTH - TRUNCATION_SUFFIX.len();
    let truncated: String = content.chars().take(max_chars).collect();
    format!("{}{}", truncated, TRUNCATION_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::testutil::{GatedEncoder, StubEncoder};
    use std::sync::mpsc;
    use std::time::Duration;

    fn test_config() -> SemanticSearchConfig {
        SemanticSearchConfig {
            enabled: true,
            model: "all-MiniLM-L6-v2".to_string(),
            rank_threshold: 0.75,
            session_threshold: 0.8,
        }
    }

    fn food_encoder() -> StubEncoder {
        StubEncoder::new(&[
            ("i", 0.1),
            ("like", 0.1),
            ("pizza", 1.0),
            ("pasta", 1.0),
            ("hiking", 1.0),
            ("ann", 0.1),
            ("bob", 0.1),
            ("cleo", 0.1),
        ])
    }

    fn session_with(encoder: Arc<dyn TextEncoder>) -> SearchSession {
        let loader = Arc::new(ModelLoader::new(Arc::new(move || Ok(encoder.clone()))));
        SearchSession::new(loader, test_config())
    }

    fn stub_session() -> SearchSession {
        session_with(Arc::new(food_encoder()))
    }

    fn post(id: u64, username: &str, post_text: &str) -> Post {
        Post {
            id,
            username: username.to_string(),
            post_text: post_text.to_string(),
        }
    }

    fn posts() -> Vec<Post> {
        vec![
            post(0, "ann", "I like pizza"),
            post(1, "bob", "I like pasta"),
            post(2, "cleo", "I like hiking"),
        ]
    }

    #[test]
    fn test_commit_rejects_stale_token() {
        let session = stub_session();

        let t1 = session.begin_refresh();
        let t2 = session.begin_refresh();

        assert!(!session.commit(t1, HashMap::new()));
        assert!(session.commit(t2, HashMap::new()));
    }

    #[test]
    fn test_commit_keeps_newer_index() {
        let session = stub_session();

        let t1 = session.begin_refresh();
        let t2 = session.begin_refresh();

        let mut newer = HashMap::new();
        newer.insert(7, vec![1.0; 8]);
        assert!(session.commit(t2, newer));

        let mut stale = HashMap::new();
        stale.insert(9, vec![0.5; 8]);
        assert!(!session.commit(t1, stale));

        let index = session.index.lock().unwrap();
        assert!(index.vectors.contains_key(&7));
        assert!(!index.vectors.contains_key(&9));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_then_rank() {
        let session = stub_session();
        let posts = posts();

        assert!(!session.is_ready());
        assert!(session.refresh_embeddings(&posts).await.unwrap());
        assert!(session.is_ready());
        assert_eq!(session.indexed_count(), 3);

        let ranked = session
            .rank(&posts, "pizza or pasta", Some(0.5))
            .await
            .unwrap();

        let ids: Vec<u64> = ranked.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rank_skips_posts_without_embeddings() {
        let session = stub_session();
        let indexed = posts();
        session.refresh_embeddings(&indexed).await.unwrap();

        let mut with_new_post = indexed.clone();
        with_new_post.push(post(3, "dana", "pizza pizza pizza"));

        let ranked = session
            .rank(&with_new_post, "pizza", Some(0.0))
            .await
            .unwrap();

        // the unindexed post cannot appear until the next refresh
        assert!(!ranked.iter().any(|p| p.id == 3));
        assert!(ranked.iter().any(|p| p.id == 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rank_rejects_blank_query() {
        let session = stub_session();
        session.refresh_embeddings(&posts()).await.unwrap();

        let result = session.rank(&posts(), "   ", None).await;
        assert!(matches!(
            result,
            Err(SearchError::Rank(RankError::EmptyQuery))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disabled_session_refuses_work() {
        let loader = Arc::new(ModelLoader::new(Arc::new(|| {
            Ok(Arc::new(StubEncoder::unit()) as Arc<dyn TextEncoder>)
        })));
        let mut config = test_config();
        config.enabled = false;
        let session = SearchSession::new(loader, config);

        assert!(!session.is_ready());
        assert!(matches!(
            session.refresh_embeddings(&posts()).await,
            Err(SearchError::Disabled)
        ));
        assert!(matches!(
            session.rank(&posts(), "pizza", None).await,
            Err(SearchError::Disabled)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rank_fresh_sees_new_posts_immediately() {
        let session = stub_session();
        session.refresh_embeddings(&posts()).await.unwrap();

        let mut with_new_post = posts();
        with_new_post.push(post(3, "dana", "pizza pizza pizza"));

        let ranked = session
            .rank_fresh(&with_new_post, "pizza", 0.5)
            .await
            .unwrap();

        assert!(ranked.iter().any(|p| p.id == 3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_threshold_comparison_differs_between_paths() {
        // a post whose session text exactly equals the query scores 1.0
        let encoder = StubEncoder::new(&[("pizza", 1.0)]);
        let session = session_with(Arc::new(encoder));
        let posts = vec![Post {
            id: 0,
            username: "pizza".to_string(),
            post_text: "pizza".to_string(),
        }];
        session.refresh_embeddings(&posts).await.unwrap();

        // one-shot path is inclusive at the threshold
        let fresh = session.rank_fresh(&posts, "pizza pizza", 1.0).await.unwrap();
        assert_eq!(fresh.len(), 1);

        // session path is strict
        let ranked = session.rank(&posts, "pizza pizza", Some(1.0)).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_superseded_batch_does_not_overwrite_newer_results() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (gate_a_tx, gate_a_rx) = mpsc::channel();
        let (gate_b_tx, gate_b_rx) = mpsc::channel();

        let encoder = Arc::new(GatedEncoder::new(
            food_encoder(),
            vec![gate_a_rx, gate_b_rx],
            entered_tx,
        ));
        let session = Arc::new(session_with(encoder));

        let posts_v1 = vec![post(0, "ann", "I like pizza")];
        let posts_v2 = vec![
            post(0, "ann", "I like pizza"),
            post(1, "bob", "I like pasta"),
        ];

        let task_a = tokio::spawn({
            let session = session.clone();
            let posts = posts_v1.clone();
            async move { session.refresh_embeddings(&posts).await }
        });
        // wait until batch A is inside the encoder before starting B,
        // so A holds the older generation token
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let task_b = tokio::spawn({
            let session = session.clone();
            let posts = posts_v2.clone();
            async move { session.refresh_embeddings(&posts).await }
        });
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // let the newer batch finish first
        gate_b_tx.send(()).unwrap();
        assert!(task_b.await.unwrap().unwrap());
        assert_eq!(session.indexed_count(), 2);

        // now resolve the stale batch, it must be discarded
        gate_a_tx.send(()).unwrap();
        assert!(!task_a.await.unwrap().unwrap());
        assert_eq!(session.indexed_count(), 2);
    }

    #[test]
    fn test_embedding_text_joins_username_and_text() {
        let post = post(0, "ann", "hello world");
        assert_eq!(embedding_text(&post), "ann: hello world");
    }

    #[test]
    fn test_embedding_text_truncates_long_posts() {
        let long = "x".repeat(600);
        let post = post(0, "ann", &long);

        let text = embedding_text(&post);
        assert!(text.len() <= MAX_CONTENT_LENGTH);
        assert!(text.ends_with(TRUNCATION_SUFFIX));
    }
}

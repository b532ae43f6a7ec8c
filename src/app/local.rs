use std::sync::{Arc, RwLock};

use serde::Serialize;

use crate::{
    config::Config,
    posts::{self, Post, PostCreate, PostManager},
    semantic::fallback::substring_search,
    semantic::loader::ModelLoader,
    semantic::session::SearchSession,
};

use super::errors::AppError;

/// Which search path produced a result set.
///
/// `Fallback` doubles as the "search degraded" notice: results are
/// still rendered, just not semantically ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Ranked by embedding similarity.
    Semantic,
    /// Case-insensitive substring matching.
    Fallback,
    /// Empty query, full corpus in original order.
    All,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub posts: Vec<Post>,
    pub mode: SearchMode,
}

pub struct AppLocal {
    pub post_mgr: Arc<dyn PostManager>,
    session: Arc<SearchSession>,
    config: Arc<RwLock<Config>>,
}

impl AppLocal {
    pub fn new(config: Arc<RwLock<Config>>) -> anyhow::Result<Self> {
        let (base_path, semantic_config) = {
            let config = config.read().unwrap();
            (
                config.base_path().to_string(),
                config.semantic_search.clone(),
            )
        };

        let posts_path = format!("{base_path}/posts.csv");
        let post_mgr = Arc::new(posts::BackendCsv::load(&posts_path)?);

        let loader = Arc::new(ModelLoader::from_config(
            &semantic_config,
            base_path.into(),
        ));
        let session = Arc::new(SearchSession::new(loader, semantic_config));

        Ok(Self {
            post_mgr,
            session,
            config,
        })
    }

    pub fn new_with(
        post_mgr: Arc<dyn PostManager>,
        session: Arc<SearchSession>,
        config: Arc<RwLock<Config>>,
    ) -> Self {
        Self {
            post_mgr,
            session,
            config,
        }
    }

    pub fn config(&self) -> Arc<RwLock<Config>> {
        self.config.clone()
    }

    pub fn session(&self) -> Arc<SearchSession> {
        self.session.clone()
    }

    pub fn is_model_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn list_posts(&self) -> Result<Vec<Post>, AppError> {
        Ok(self.post_mgr.list()?)
    }

    pub fn total(&self) -> Result<usize, AppError> {
        Ok(self.post_mgr.total()?)
    }

    pub fn create_post(&self, post_create: PostCreate) -> Result<Post, AppError> {
        post_create.validate()?;
        Ok(self.post_mgr.create(post_create)?)
    }

    /// Recompute the session embeddings from the current post list.
    /// Triggers the model download on first call.
    pub async fn refresh_session(&self) -> Result<bool, AppError> {
        let posts = self.post_mgr.list()?;
        self.session
            .refresh_embeddings(&posts)
            .await
            .map_err(|err| AppError::Other(err.into()))
    }

    /// Refresh the session embeddings in the background.
    pub fn spawn_refresh(self: Arc<Self>) {
        if !self.session.is_enabled() {
            return;
        }

        tokio::spawn(async move {
            match self.refresh_session().await {
                Ok(true) => log::debug!("session embeddings refreshed"),
                Ok(false) => log::debug!("session refresh superseded by a newer one"),
                Err(err) => log::warn!("failed to refresh session embeddings: {err}"),
            }
        });
    }

    /// Substring search without touching the model.
    pub fn plain_search(&self, query: &str) -> Result<SearchOutcome, AppError> {
        let posts = self.post_mgr.list()?;

        if query.is_empty() {
            return Ok(SearchOutcome {
                posts,
                mode: SearchMode::All,
            });
        }

        Ok(SearchOutcome {
            posts: substring_search(&posts, query),
            mode: SearchMode::Fallback,
        })
    }

    /// One-shot search that re-embeds the corpus for this query instead
    /// of using the session index, waiting for the model if necessary.
    /// Degrades to substring matching when the model is unavailable.
    pub async fn search_posts_once(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<SearchOutcome, AppError> {
        let posts = self.post_mgr.list()?;

        if query.trim().is_empty() {
            return Ok(SearchOutcome {
                posts,
                mode: SearchMode::All,
            });
        }

        let threshold = threshold
            .unwrap_or_else(|| self.config.read().unwrap().semantic_search.rank_threshold);

        match self.session.rank_fresh(&posts, query, threshold).await {
            Ok(ranked) => Ok(SearchOutcome {
                posts: ranked,
                mode: SearchMode::Semantic,
            }),
            Err(err) => {
                log::warn!("semantic search failed, falling back to substring search: {err}");
                Ok(SearchOutcome {
                    posts: substring_search(&posts, query),
                    mode: SearchMode::Fallback,
                })
            }
        }
    }

    /// Search posts, preferring the semantic ranker and degrading to
    /// substring matching when the model is not ready or errors out.
    pub async fn search_posts(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<SearchOutcome, AppError> {
        let posts = self.post_mgr.list()?;

        if query.trim().is_empty() {
            return Ok(SearchOutcome {
                posts,
                mode: SearchMode::All,
            });
        }

        if !self.session.is_ready() {
            return Ok(SearchOutcome {
                posts: substring_search(&posts, query),
                mode: SearchMode::Fallback,
            });
        }

        match self.session.rank(&posts, query, threshold).await {
            Ok(ranked) => Ok(SearchOutcome {
                posts: ranked,
                mode: SearchMode::Semantic,
            }),
            Err(err) => {
                log::warn!("semantic search failed, falling back to substring search: {err}");
                Ok(SearchOutcome {
                    posts: substring_search(&posts, query),
                    mode: SearchMode::Fallback,
                })
            }
        }
    }
}

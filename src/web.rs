use crate::{
    app::{AppError, AppLocal, SearchMode, SearchOutcome},
    posts::{Post, PostCreate},
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    app: Arc<AppLocal>,
}

async fn start_app(app: Arc<AppLocal>) {
    let listen_addr = app.config().read().unwrap().listen_addr.clone();

    // warm the model and session embeddings while the server comes up;
    // searches in the meantime take the fallback path
    app.clone().spawn_refresh();

    let shared_state = Arc::new(SharedState { app });

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let app = router(shared_state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await.unwrap();
    log::info!("listening on {listen_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

fn router(shared_state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/api/posts/list", get(list))
        .route("/api/posts/create", post(create))
        .route("/api/posts/search", post(search))
        .route("/api/posts/total", get(total))
        .route("/api/search/status", get(search_status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

#[cfg(test)]
pub(crate) fn test_router(app: Arc<AppLocal>) -> Router {
    router(Arc::new(SharedState { app }))
}

pub fn start_daemon(app: AppLocal) {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async { start_app(Arc::new(app)).await });
}

// Make our own error that wraps `AppError`.
#[derive(Debug)]
struct HttpError(AppError);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match self.0 {
            AppError::Validation(_) => (
                axum::http::StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": self.0.to_string()}).to_string(),
            ),
            AppError::IO(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
            AppError::Other(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": self.0.to_string()}).to_string(),
                )
            }
        }
        .into_response()
    }
}

// This enables using `?` on functions that return `Result<_, AppError>`
// to turn them into `Result<_, HttpError>` without manual mapping.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

async fn list(State(state): State<Arc<SharedState>>) -> Result<axum::Json<Vec<Post>>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || app.list_posts().map(Into::into).map_err(Into::into))
}

async fn create(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<PostCreate>,
) -> Result<axum::Json<Post>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    let created = tokio::task::block_in_place({
        let app = app.clone();
        move || app.create_post(payload)
    })?;

    // embeddings for the new post are computed in the background;
    // until they land, searches see it through the fallback path only
    app.spawn_refresh();

    Ok(created.into())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,

    /// Similarity threshold override [-1.0, 1.0]
    pub threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub posts: Vec<Post>,
    pub mode: SearchMode,
    pub model_ready: bool,
}

async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<axum::Json<SearchResponse>, HttpError> {
    log::debug!("payload: {payload:?}");

    let app = state.app.clone();

    let SearchOutcome { posts, mode } =
        app.search_posts(&payload.query, payload.threshold).await?;

    Ok(SearchResponse {
        posts,
        mode,
        model_ready: app.is_model_ready(),
    }
    .into())
}

#[derive(Debug, Serialize)]
pub struct TotalResponse {
    pub total: usize,
}

async fn total(
    State(state): State<Arc<SharedState>>,
) -> Result<axum::Json<TotalResponse>, HttpError> {
    let app = state.app.clone();

    tokio::task::block_in_place(move || {
        app.total()
            .map(|total| TotalResponse { total }.into())
            .map_err(Into::into)
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub model_ready: bool,
    pub indexed: usize,
}

async fn search_status(State(state): State<Arc<SharedState>>) -> axum::Json<StatusResponse> {
    let app = &state.app;

    axum::Json(StatusResponse {
        model_ready: app.is_model_ready(),
        indexed: app.session().indexed_count(),
    })
}

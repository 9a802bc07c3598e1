use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sitesearch_core::error::{IndexingError, SearchError};
use sitesearch_core::search::SearchHit;
use sitesearch_core::{stats, SearchEngine, Store};
use sitesearch_crawler::IndexingService;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub indexing: Arc<IndexingService>,
    pub search: Arc<SearchEngine>,
    pub store: Store,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct IndexPageParams {
    #[serde(default)]
    pub url: String,
}

#[derive(Serialize)]
pub struct SearchBody {
    pub result: bool,
    pub count: usize,
    pub data: Vec<SearchHit>,
}

/// Error shape shared by every endpoint: `{result: false, error}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "result": false, "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

impl From<IndexingError> for ApiError {
    fn from(e: IndexingError) -> Self {
        match e {
            IndexingError::Internal(e) => internal(e),
            rejected => ApiError::bad_request(rejected.to_string()),
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Internal(e) => internal(e),
            rejected => ApiError::bad_request(rejected.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        internal(e)
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %e, "request failed");
    ApiError { status: StatusCode::INTERNAL_SERVER_ERROR, message: e.to_string() }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn ok() -> ApiResult {
    Ok(Json(serde_json::json!({ "result": true })))
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let api = Router::new()
        .route("/statistics", get(statistics_handler))
        .route("/startIndexing", get(start_indexing_handler))
        .route("/stopIndexing", get(stop_indexing_handler))
        .route("/indexPage", post(index_page_handler))
        .route("/search", get(search_handler));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn statistics_handler(State(state): State<AppState>) -> ApiResult {
    let statistics = stats::collect(&state.store, state.indexing.is_indexing())?;
    Ok(Json(serde_json::json!({ "result": true, "statistics": statistics })))
}

pub async fn start_indexing_handler(State(state): State<AppState>) -> ApiResult {
    let handle = state.indexing.spawn_indexing()?;
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "indexing run panicked");
        }
    });
    ok()
}

pub async fn stop_indexing_handler(State(state): State<AppState>) -> ApiResult {
    state.indexing.stop_indexing()?;
    ok()
}

pub async fn index_page_handler(State(state): State<AppState>, Query(params): Query<IndexPageParams>) -> ApiResult {
    let url = params.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("Page url is empty"));
    }
    state.indexing.index_page(url).await?;
    ok()
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchBody>, ApiError> {
    let start = std::time::Instant::now();
    let limit = params.limit.unwrap_or(state.search.default_limit());
    let site = params.site.as_deref().filter(|s| !s.trim().is_empty());
    let resp = state.search.search(&params.query, site, params.offset, limit)?;
    tracing::info!(query = %params.query, count = resp.count, took_ms = start.elapsed().as_millis() as u64, "search");
    Ok(Json(SearchBody { result: true, count: resp.count, data: resp.results }))
}

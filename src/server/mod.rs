//! Read API server module.
//!
//! Exposes the five read patterns over HTTP with axum. Every successful response
//! is the query envelope (`query_type`, `parameters`, `results`, `count`,
//! `execution_time_ms`); failures are JSON objects with an `error` field.
//!
//! | Route                                        | Pattern                |
//! |----------------------------------------------|------------------------|
//! | `GET /papers/recent?category=&limit=`        | `recent_in_category`   |
//! | `GET /papers/author/{name}`                  | `papers_by_author`     |
//! | `GET /papers/{id}`                           | `get_paper_by_id`      |
//! | `GET /papers/search?category=&start=&end=`   | `papers_in_date_range` |
//! | `GET /papers/keyword/{kw}?limit=`            | `papers_by_keyword`    |
//! | `GET /health`                                | liveness + item count  |

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::query::{QueryEngine, QueryError, QueryResponse};
use crate::storage::ProjectionStore;

/// Errors that can occur while serving requests.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or malformed request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No route matched the request path
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store failed while answering
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Binding or serving the listener failed
    #[error("Initialization error: {0}")]
    InitializationError(String),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

impl From<QueryError> for ServerError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidQuery(msg) => ServerError::InvalidRequest(msg),
            QueryError::StorageError(msg) => ServerError::QueryFailed(msg),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ServerError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": "not found" })),
            ServerError::QueryFailed(detail) | ServerError::InitializationError(detail) => {
                error!("Request failed: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "server error", "detail": detail }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

type SharedEngine<S> = Arc<QueryEngine<S>>;

/// Build the router serving every read route over `engine`.
pub fn build_router<S>(engine: QueryEngine<S>) -> Router
where
    S: ProjectionStore + 'static,
{
    Router::new()
        .route("/health", get(health_handler::<S>))
        .route("/papers/recent", get(recent_handler::<S>))
        .route("/papers/search", get(date_range_handler::<S>))
        .route("/papers/author/:name", get(author_handler::<S>))
        .route("/papers/keyword/:keyword", get(keyword_handler::<S>))
        .route("/papers/:arxiv_id", get(paper_handler::<S>))
        .fallback(fallback_handler)
        .with_state(Arc::new(engine))
}

/// Bind `address` and serve `router` until Ctrl-C.
///
/// # Errors
/// Returns `ServerError::InitializationError` if the address cannot be bound or
/// the server stops with an IO error
pub async fn serve(router: Router, address: &str) -> ServerResult<()> {
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| ServerError::InitializationError(format!("bind {}: {}", address, e)))?;
    info!("Read API listening on {}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::InitializationError(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

async fn health_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
) -> ServerResult<Json<serde_json::Value>> {
    let items = engine
        .store()
        .count_items()
        .await
        .map_err(|e| ServerError::QueryFailed(e.to_string()))?;
    Ok(Json(json!({ "status": "ok", "items": items })))
}

async fn recent_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
    Query(params): Query<HashMap<String, String>>,
) -> ServerResult<Json<QueryResponse>> {
    debug!("GET /papers/recent {:?}", params);
    let category = required_param(&params, "category")?;
    let limit = limit_param(&params)?;
    Ok(Json(engine.recent_in_category(category, limit).await?))
}

async fn author_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
    Path(name): Path<String>,
) -> ServerResult<Json<QueryResponse>> {
    debug!("GET /papers/author/{}", name);
    Ok(Json(engine.papers_by_author(&name).await?))
}

async fn paper_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
    Path(arxiv_id): Path<String>,
) -> ServerResult<Json<QueryResponse>> {
    debug!("GET /papers/{}", arxiv_id);
    Ok(Json(engine.get_by_id(&arxiv_id).await?))
}

async fn date_range_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
    Query(params): Query<HashMap<String, String>>,
) -> ServerResult<Json<QueryResponse>> {
    debug!("GET /papers/search {:?}", params);
    let category = required_param(&params, "category")?;
    let start = required_param(&params, "start")?;
    let end = required_param(&params, "end")?;
    Ok(Json(engine.papers_in_date_range(category, start, end).await?))
}

async fn keyword_handler<S: ProjectionStore + 'static>(
    State(engine): State<SharedEngine<S>>,
    Path(keyword): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ServerResult<Json<QueryResponse>> {
    debug!("GET /papers/keyword/{} {:?}", keyword, params);
    let limit = limit_param(&params)?;
    Ok(Json(engine.papers_by_keyword(&keyword, limit).await?))
}

async fn fallback_handler(uri: axum::http::Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

fn required_param<'a>(params: &'a HashMap<String, String>, name: &str) -> ServerResult<&'a str> {
    match params.get(name).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ServerError::InvalidRequest(format!("missing {}", name))),
    }
}

fn limit_param(params: &HashMap<String, String>) -> ServerResult<Option<usize>> {
    match params.get("limit") {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ServerError::InvalidRequest(format!("limit must be a positive integer, got {:?}", raw))),
    }
}

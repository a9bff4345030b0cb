//! HTTP query server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/`, `/v1/query` | Answer `{query, user}` with `{result}` |
//! | `POST` | `/documents` | Enqueue `{doc}` for indexing (202) |
//! | `GET`  | `/health` | Status, version and counters |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `timeout` (504),
//! `unavailable` (503), `internal` (500). Bodies that are not valid JSON or
//! lack a required field are `bad_request` too.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rag_sentinel_core::models::DocumentRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::SentinelError;
use crate::ingest::DocumentSender;
use crate::pipeline::QueryPipeline;
use crate::stats::StatsSnapshot;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<QueryPipeline>,
    pub documents: DocumentSender,
}

/// Build the router. Split from [`run_server`] so tests can serve it on an
/// ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", post(handle_query))
        .route("/v1/query", post(handle_query))
        .route("/documents", post(handle_document))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Serve on `bind_addr` until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!(addr = %listener.local_addr()?, "query server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn app_error(status: StatusCode, code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status,
        code: code.to_string(),
        message: message.into(),
    }
}

impl From<SentinelError> for AppError {
    fn from(err: SentinelError) -> Self {
        let message = err.to_string();
        match err {
            SentinelError::BadRequest(_) => app_error(StatusCode::BAD_REQUEST, "bad_request", message),
            SentinelError::ExternalCall { .. } => {
                app_error(StatusCode::BAD_GATEWAY, "upstream_error", message)
            }
            SentinelError::Timeout { .. } => {
                app_error(StatusCode::GATEWAY_TIMEOUT, "timeout", message)
            }
            SentinelError::Configuration(_) | SentinelError::Delivery(_) => {
                app_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        app_error(StatusCode::BAD_REQUEST, "bad_request", rejection.body_text())
    }
}

// ============ POST / and /v1/query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    user: String,
}

#[derive(Serialize)]
struct QueryResponse {
    result: String,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body?;
    let result = state.pipeline.handle(&req.user, &req.query).await?;
    Ok(Json(QueryResponse { result }))
}

// ============ POST /documents ============

#[derive(Serialize)]
struct DocumentAccepted {
    status: &'static str,
}

async fn handle_document(
    State(state): State<AppState>,
    body: Result<Json<DocumentRecord>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentAccepted>), AppError> {
    let Json(record) = body?;
    state.documents.send(record).await.map_err(|_| {
        app_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "unavailable",
            "document indexer is not running",
        )
    })?;
    Ok((StatusCode::ACCEPTED, Json(DocumentAccepted { status: "queued" })))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    version: String,
    stats: StatsSnapshot,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        stats: state.pipeline.stats().snapshot(),
    })
}

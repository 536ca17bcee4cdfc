//! HTTP surface for the query pipeline.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/query` | Answer a question within a session |
//! | `GET`  | `/api/courses` | Course count and titles |
//! | `POST` | `/api/sessions/{id}/clear` | Drop a session's history |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! `generation_failed` (502), `index_unavailable` (503), `bad_request` (400),
//! `not_found` (404), anything else 500.
//!
//! CORS permits all origins, methods, and headers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::RagError;
use crate::models::{CourseAnalytics, QueryResponse};
use crate::rag::RagSystem;

#[derive(Clone)]
struct AppState {
    rag: Arc<RagSystem>,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClearResponse {
    session_id: String,
    cleared: bool,
}

/// Build the router over a ready system. Split out from [`run_server`] so
/// callers can mount it elsewhere.
pub fn router(rag: Arc<RagSystem>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/query", post(handle_query))
        .route("/api/courses", get(handle_courses))
        .route("/api/sessions/{id}/clear", post(handle_clear_session))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { rag })
}

/// Bind to `[server].bind` and serve until the process exits.
pub async fn run_server(rag: Arc<RagSystem>) -> anyhow::Result<()> {
    let bind_addr = rag.config().server.bind.clone();
    let app = router(rag);

    tracing::info!(bind = %bind_addr, "server listening");
    println!("Listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
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

#[derive(Debug)]
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

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let status = match &err {
            RagError::Generation(_) => StatusCode::BAD_GATEWAY,
            RagError::IndexUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

// ============ Handlers ============

async fn handle_query(
    State(state): State<AppState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let session_id = req.session_id.as_deref().filter(|s| !s.is_empty());
    match state.rag.answer(query, session_id).await {
        Ok(resp) => Ok(Json(resp)),
        Err(e) => {
            tracing::error!(error = %e, "query failed");
            Err(e.into())
        }
    }
}

async fn handle_courses(
    State(state): State<AppState>,
) -> Result<Json<CourseAnalytics>, AppError> {
    Ok(Json(state.rag.course_analytics().await?))
}

async fn handle_clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    if state.rag.sessions().clear(&id).await {
        Ok(Json(ClearResponse {
            session_id: id,
            cleared: true,
        }))
    } else {
        Err(not_found(format!("session '{}' not found", id)))
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

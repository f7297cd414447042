//! HTTP surface.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` (`server.chat_path`) | Answer a question |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Contract
//!
//! ```json
//! // request
//! { "message": "who was the best Cubs pitcher of all time?" }
//! // 200
//! { "response": "Well now, friend..." }
//! // 400
//! { "error": "Invalid request: message is required" }
//! // 500
//! { "error": "Failed to create embedding for the message",
//!   "details": { "code": "embedding_failure", "stage": "embedding", "message": "..." } }
//! ```
//!
//! A generation failure answers 200 with the fallback message unless
//! `generation.on_failure = "error"`.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::{PipelineError, Stage};
use crate::pipeline::Pipeline;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

/// Builds the pipeline from `config` and serves until Ctrl+C / SIGTERM.
///
/// Missing credentials or an unreachable index fail here, before the
/// listener is bound.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(config).await?);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        "Old Timer listening on http://{}{}",
        listener.local_addr()?,
        config.server.chat_path
    );

    axum::serve(listener, router(pipeline, &config.server.chat_path))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Builds the router around an existing pipeline.
pub fn router(pipeline: Arc<Pipeline>, chat_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(chat_path, post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { pipeline })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<ErrorDetail>,
}

/// Diagnostic detail attached to server-side failures.
#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    stage: Stage,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError(PipelineError);

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let details = (!err.is_client_error()).then(|| ErrorDetail {
            code: err.code(),
            stage: err.stage(),
            message: err.to_string(),
        });
        let body = ErrorBody {
            error: err.public_message(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

// ============ POST /api/chat ============

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

/// Handler for the chat endpoint.
///
/// The body is taken raw so that malformed or non-JSON payloads are
/// reported as validation errors (400) rather than extractor rejections.
async fn handle_chat(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ChatResponse>, AppError> {
    let outcome = state.pipeline.handle_payload(&body).await?;
    Ok(Json(ChatResponse {
        response: outcome.answer,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

//! HTTP invocation surface.
//!
//! A thin axum layer over the pipeline: POST /invoke takes the original
//! event JSON and returns the destination key, plus a health endpoint. The
//! boundary turns pipeline errors into structured error responses; nothing
//! below it terminates the process.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::{Pipeline, WatermarkRequest};

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_app(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/invoke", post(invoke_handler))
        .route("/health", get(health_handler))
        .with_state(AppState { pipeline })
}

async fn invoke_handler(
    State(state): State<AppState>,
    Json(request): Json<WatermarkRequest>,
) -> Response {
    match state.pipeline.handle(&request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            let status = match &e {
                PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Bind the configured address and serve requests until shutdown.
pub async fn serve(config: Arc<Config>, pipeline: Arc<Pipeline>) -> anyhow::Result<()> {
    let app = create_app(pipeline);
    let addr = format!("{}:{}", config.listen_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(address = %addr, "starting watermark service");
    axum::serve(listener, app).await?;
    Ok(())
}

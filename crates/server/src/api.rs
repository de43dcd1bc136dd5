use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub pending: usize,
    pub running: usize,
    pub maximum: usize,
}

#[derive(Serialize)]
struct HealthError {
    status: &'static str,
    error: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.scheduler.stats().await {
        Ok(stats) => Json(HealthResponse {
            status: "ok",
            pending: stats.pending,
            running: stats.running,
            maximum: stats.maximum,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthError {
                    status: "error",
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

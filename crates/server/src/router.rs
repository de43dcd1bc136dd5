//! HTTP router construction.
//!
//! `/health` is matched before the catch-all, so every other path is a
//! WebSocket channel.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::{api, live};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/{*channel}", get(live::ws_upgrade))
        .with_state(state)
}

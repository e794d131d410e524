//! HTTP ops endpoints.
//!
//! Read-only views for operators; the exam protocol itself is served by
//! [`crate::server`].

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::metrics::MetricsSnapshot;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /api/health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/metrics
///
/// Counters since process start, including sweeper failures that are never
/// reported to clients.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

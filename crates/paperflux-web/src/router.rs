//! Axum router — maps all URL paths to handlers.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{
    papers::{api_paper, api_papers, index},
    process::{api_status, process_run},
};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Pages
        .route("/", get(index))
        .route("/process", post(process_run))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // API endpoints
        .route("/api/papers", get(api_papers))
        .route("/api/papers/{paper_id}", get(api_paper))
        .route("/api/status", get(api_status))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

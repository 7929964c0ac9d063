//! Router assembly.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::SharedState;

/// Build the application router for the given state.
pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.http.max_body_size;

    Router::new()
        .route("/api/tryon", post(handlers::tryon))
        .route("/api/v1/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

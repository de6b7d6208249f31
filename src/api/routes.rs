//! API route definitions
//!
//! - POST /api/v1/events          - batch ingestion
//! - POST /api/v1/events/:type    - single event ingestion
//! - GET  /api/v1/stats           - click/return statistics
//! - GET  /api/v1/estimates       - completion estimates
//! - GET  /health                 - liveness and storage backend

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/events", post(handlers::post_events))
        .route("/events/:event_type", post(handlers::post_event))
        .route("/stats", get(handlers::get_stats))
        .route("/estimates", get(handlers::get_estimates))
        .with_state(state)
}

pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

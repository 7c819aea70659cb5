//! Router configuration for the HTTP API.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Source policies
        .route(
            "/api/policies",
            get(handlers::list_policies).post(handlers::create_policy),
        )
        .route("/api/policies/calibrate", post(handlers::calibrate))
        .route(
            "/api/policies/:id",
            get(handlers::get_policy)
                .patch(handlers::patch_policy)
                .delete(handlers::delete_policy),
        )
        .route("/api/policies/:id/recovery", post(handlers::recover))
        // Jobs. Static paths are declared alongside `:id`; axum prefers them.
        .route("/api/ingest", post(handlers::ingest))
        .route(
            "/api/jobs",
            get(handlers::list_jobs).post(handlers::create_job),
        )
        .route("/api/jobs/pending", get(handlers::list_pending_jobs))
        .route("/api/jobs/retryable", get(handlers::list_retryable_jobs))
        .route("/api/jobs/:id", get(handlers::get_job))
        .route("/api/jobs/:id/run", post(handlers::run_job))
        // Discovery
        .route("/api/harvest/auto", post(handlers::auto_harvest))
        // Ops
        .route("/api/telemetry", get(handlers::telemetry))
        .route("/api/alerts", get(handlers::alerts))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/recipes/:recipe_id/steps/:step_id", get(step_status_handler))
        .route("/recipes/:recipe_id/steps/:step_id/stream", get(step_stream_handler))
        .route("/recipes/:recipe_id/steps/:step_id/start", post(start_handler))
        .route("/recipes/:recipe_id/steps/:step_id/pause", post(pause_handler))
        .route("/recipes/:recipe_id/steps/:step_id/resume", post(resume_handler))
        .route("/recipes/:recipe_id/steps/:step_id/reset", post(reset_handler))
        .route("/recipes/:recipe_id/timers", get(recipe_timers_handler))
        .route("/recipes/:recipe_id/timers/stream", get(recipe_timers_stream_handler))
        .route("/recipes/:recipe_id/stop-all", post(stop_all_handler))
        .route("/active", get(active_handler))
        .route("/sweep", post(sweep_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

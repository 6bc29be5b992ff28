//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod pipeline;
pub mod run;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use conveyor_runner::PipelineRunCoordinator;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub coordinator: PipelineRunCoordinator,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route(
            "/pipelines",
            post(pipeline::create_pipeline).get(pipeline::list_pipelines),
        )
        .route(
            "/pipelines/{id}",
            get(pipeline::get_pipeline).delete(pipeline::delete_pipeline),
        )
        .route(
            "/pipelines/{id}/runs",
            post(run::start_run).get(run::list_runs),
        )
        // Run endpoints
        .route("/runs/{id}", get(run::get_run).delete(run::delete_run))
        .route("/runs/{id}/cancel", post(run::cancel_run))
        // Job endpoints
        .route("/jobs", get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/runs", get(job::list_job_runs))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

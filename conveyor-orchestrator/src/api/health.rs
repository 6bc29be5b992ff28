//! Health Check API Handler
//!
//! Reports database reachability and how many runs are being driven.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let active_runs = state.coordinator.active_run_ids().await.len();

    let (status, label) = if database {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status,
        Json(serde_json::json!({
            "status": label,
            "database": database,
            "active_runs": active_runs,
        })),
    )
}

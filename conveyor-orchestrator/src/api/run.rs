//! Run API Handlers
//!
//! HTTP endpoints for starting, inspecting and cancelling pipeline runs.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conveyor_core::dto::run::PipelineRunView;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::run_service;

/// POST /pipelines/{id}/runs
/// Create a run of the pipeline and start it
pub async fn start_run(
    State(state): State<AppState>,
    Path(pipeline_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<PipelineRunView>)> {
    tracing::info!("Starting run of pipeline: {}", pipeline_id);

    let run = run_service::start_run(&state.pool, &state.coordinator, pipeline_id).await?;

    Ok((StatusCode::ACCEPTED, Json(run.into())))
}

/// GET /pipelines/{id}/runs
/// List the runs of a pipeline, most recent first
pub async fn list_runs(
    State(pool): State<PgPool>,
    Path(pipeline_id): Path<Uuid>,
) -> ApiResult<Json<Vec<PipelineRunView>>> {
    tracing::debug!("Listing runs of pipeline: {}", pipeline_id);

    let runs = run_service::list_runs(&pool, pipeline_id).await?;

    Ok(Json(runs.into_iter().map(PipelineRunView::from).collect()))
}

/// GET /runs/{id}
/// Get a pipeline run with its job runs and logs
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRunView>> {
    tracing::debug!("Getting pipeline run: {}", id);

    let run = run_service::get_run(&state.pool, &state.coordinator, id).await?;

    Ok(Json(run.into()))
}

/// POST /runs/{id}/cancel
/// Cancel a running pipeline run
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRunView>> {
    tracing::info!("Cancelling pipeline run: {}", id);

    let run = run_service::cancel_run(&state.coordinator, id).await?;

    Ok(Json(run.into()))
}

/// DELETE /runs/{id}
/// Delete a finished pipeline run and its job runs
pub async fn delete_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline run: {}", id);

    run_service::delete_run(&state.pool, &state.coordinator, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

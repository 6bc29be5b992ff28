//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conveyor_core::domain::pipeline::Pipeline;
use conveyor_core::dto::pipeline::{CreatePipeline, PipelineSummary};
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::pipeline_service;

/// POST /pipelines
/// Create a new pipeline with its jobs
pub async fn create_pipeline(
    State(pool): State<PgPool>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<Pipeline>)> {
    tracing::info!("Creating pipeline: {}", req.name);

    let pipeline = pipeline_service::create_pipeline(&pool, req).await?;

    Ok((StatusCode::CREATED, Json(pipeline)))
}

/// GET /pipelines
/// List all pipelines
pub async fn list_pipelines(State(pool): State<PgPool>) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing all pipelines");

    let pipelines = pipeline_service::list_pipelines(&pool).await?;

    Ok(Json(pipelines))
}

/// GET /pipelines/{id}
/// Get pipeline by ID, with its jobs and runs
pub async fn get_pipeline(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = pipeline_service::get_pipeline(&pool, id).await?;

    Ok(Json(pipeline))
}

/// DELETE /pipelines/{id}
/// Delete a pipeline with its jobs and run history
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting pipeline: {}", id);

    pipeline_service::delete_pipeline(&state.pool, &state.coordinator, id).await?;

    Ok(StatusCode::NO_CONTENT)
}

//! Job API Handlers
//!
//! Read-only endpoints for job templates and their runs.

use axum::{
    Json,
    extract::{Path, State},
};
use conveyor_core::domain::job::Job;
use conveyor_core::dto::run::JobRunView;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::job_service;

/// GET /jobs
/// List all job templates
pub async fn list_jobs(State(pool): State<PgPool>) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing all jobs");

    let jobs = job_service::list_jobs(&pool).await?;

    Ok(Json(jobs))
}

/// GET /jobs/{id}
/// Get job template by ID
pub async fn get_job(State(pool): State<PgPool>, Path(id): Path<Uuid>) -> ApiResult<Json<Job>> {
    tracing::debug!("Getting job: {}", id);

    let job = job_service::get_job(&pool, id).await?;

    Ok(Json(job))
}

/// GET /jobs/{id}/runs
/// List the runs of a job template
pub async fn list_job_runs(
    State(pool): State<PgPool>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<JobRunView>>> {
    tracing::debug!("Listing runs of job: {}", id);

    let job_runs = job_service::list_job_runs(&pool, id).await?;

    Ok(Json(job_runs.into_iter().map(JobRunView::from).collect()))
}

//! Pipeline Service
//!
//! Business logic for pipeline management.

use conveyor_core::domain::pipeline::Pipeline;
use conveyor_core::dto::pipeline::{CreateJob, CreatePipeline, PipelineSummary};
use conveyor_runner::PipelineRunCoordinator;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::repository::pipeline_repository;

/// Service error type
#[derive(Debug)]
pub enum PipelineError {
    NotFound(Uuid),
    ValidationError(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Create a new pipeline with its job templates
pub async fn create_pipeline(pool: &PgPool, req: CreatePipeline) -> Result<Pipeline> {
    // Validate request
    validate_pipeline_request(&req)?;

    let mut pipeline = Pipeline::new(req.name, req.description);
    for job in req.jobs {
        let job = job.into_job(pipeline.id);
        pipeline.add_job(job);
    }

    pipeline_repository::create(pool, &pipeline).await?;

    tracing::info!(
        "Pipeline created: {} ({}) with {} job(s)",
        pipeline.name,
        pipeline.id,
        pipeline.jobs.len()
    );

    Ok(pipeline)
}

/// Get a pipeline with its jobs and runs
pub async fn get_pipeline(pool: &PgPool, id: Uuid) -> Result<Pipeline> {
    let pipeline = pipeline_repository::find_by_id(pool, id)
        .await?
        .ok_or(PipelineError::NotFound(id))?;

    Ok(pipeline)
}

/// List all pipelines
pub async fn list_pipelines(pool: &PgPool) -> Result<Vec<PipelineSummary>> {
    let pipelines = pipeline_repository::list_all(pool).await?;
    Ok(pipelines.iter().map(PipelineSummary::from).collect())
}

/// Delete a pipeline, its job templates and its run history
///
/// Refused while one of its runs is still being driven.
pub async fn delete_pipeline(
    pool: &PgPool,
    coordinator: &PipelineRunCoordinator,
    id: Uuid,
) -> Result<()> {
    for run_id in coordinator.active_run_ids().await {
        let Some(run) = coordinator.snapshot(run_id).await else {
            continue;
        };

        if run.pipeline_id == id && !run.is_finished() {
            return Err(PipelineError::Conflict(format!(
                "Pipeline {} has an active run ({})",
                id, run_id
            )));
        }
    }

    let deleted = pipeline_repository::delete(pool, id).await?;

    if !deleted {
        return Err(PipelineError::NotFound(id));
    }

    tracing::info!("Pipeline deleted: {}", id);

    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

fn validate_pipeline_request(req: &CreatePipeline) -> Result<()> {
    if req.name.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "Pipeline name cannot be empty".to_string(),
        ));
    }

    if req.name.len() > 255 {
        return Err(PipelineError::ValidationError(
            "Pipeline name is too long (max 255 characters)".to_string(),
        ));
    }

    let mut order_indexes = HashSet::new();
    for job in &req.jobs {
        validate_job_request(job)?;

        if !order_indexes.insert(job.order_index) {
            return Err(PipelineError::ValidationError(format!(
                "Duplicate order_index {} in job '{}'",
                job.order_index, job.name
            )));
        }
    }

    Ok(())
}

fn validate_job_request(job: &CreateJob) -> Result<()> {
    if job.name.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "Job name cannot be empty".to_string(),
        ));
    }

    if job.name.len() > 255 || job.image.len() > 255 {
        return Err(PipelineError::ValidationError(format!(
            "Job '{}' name or image is too long (max 255 characters)",
            job.name
        )));
    }

    if job.image.trim().is_empty() {
        return Err(PipelineError::ValidationError(format!(
            "Job '{}' has no image",
            job.name
        )));
    }

    if job.command.trim().is_empty() {
        return Err(PipelineError::ValidationError(format!(
            "Job '{}' has no command",
            job.name
        )));
    }

    if job.timeout_sec == Some(0) {
        return Err(PipelineError::ValidationError(format!(
            "Job '{}' timeout_sec must be greater than 0",
            job.name
        )));
    }

    if let Some(key) = job
        .env
        .keys()
        .find(|key| key.is_empty() || key.contains('='))
    {
        return Err(PipelineError::ValidationError(format!(
            "Job '{}' has an invalid environment variable name '{}'",
            job.name, key
        )));
    }

    Ok(())
}

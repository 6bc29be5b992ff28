//! Pipeline Repository
//!
//! Handles all database operations related to pipelines.
//! Deleting a pipeline removes its runs, job runs and job templates in the
//! same transaction.

use chrono::{DateTime, Utc};
use conveyor_core::domain::job::Job;
use conveyor_core::domain::pipeline::Pipeline;
use sqlx::PgPool;
use std::collections::HashMap;
use uuid::Uuid;

use super::{job_repository, run_repository};

/// Create a pipeline and its job templates
pub async fn create(pool: &PgPool, pipeline: &Pipeline) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO pipelines (id, name, description, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(pipeline.id)
    .bind(&pipeline.name)
    .bind(&pipeline.description)
    .bind(pipeline.created_at)
    .bind(pipeline.updated_at)
    .execute(&mut *tx)
    .await?;

    for job in &pipeline.jobs {
        job_repository::insert(&mut *tx, job).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Find a pipeline with its job templates, without run history
pub async fn find_definition(pool: &PgPool, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM pipelines
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut pipeline: Pipeline = row.into();
    pipeline.jobs = job_repository::find_by_pipeline(pool, id).await?;
    pipeline.sort_children();
    Ok(Some(pipeline))
}

/// Find a pipeline with its job templates and all of its runs
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Pipeline>, sqlx::Error> {
    let Some(mut pipeline) = find_definition(pool, id).await? else {
        return Ok(None);
    };

    pipeline.runs = run_repository::find_by_pipeline(pool, id).await?;
    pipeline.sort_children();
    Ok(Some(pipeline))
}

/// Check whether a pipeline exists
pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pipelines WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;

    Ok(exists)
}

/// List all pipelines with their job templates
pub async fn list_all(pool: &PgPool) -> Result<Vec<Pipeline>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, name, description, created_at, updated_at
        FROM pipelines
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut jobs: HashMap<Uuid, Vec<Job>> = HashMap::new();
    for job in job_repository::list_all(pool).await? {
        jobs.entry(job.pipeline_id).or_default().push(job);
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut pipeline: Pipeline = row.into();
            pipeline.jobs = jobs.remove(&pipeline.id).unwrap_or_default();
            pipeline.sort_children();
            pipeline
        })
        .collect())
}

/// Delete a pipeline and everything that depends on it
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        DELETE FROM job_runs
        WHERE pipeline_run_id IN (SELECT id FROM pipeline_runs WHERE pipeline_id = $1)
           OR job_id IN (SELECT id FROM jobs WHERE pipeline_id = $1)
        "#,
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM pipeline_runs WHERE pipeline_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM jobs WHERE pipeline_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM pipelines WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Internal types for database mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Pipeline {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            jobs: Vec::new(),
            runs: Vec::new(),
        }
    }
}

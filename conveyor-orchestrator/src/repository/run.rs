//! Run Repository
//!
//! Handles all database operations related to pipeline runs and job runs.

use chrono::{DateTime, Utc};
use conveyor_core::domain::run::{JobRun, PipelineRun};
use conveyor_core::domain::status::{JobStatus, PipelineStatus};
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::decode_error;

/// Insert or update a pipeline run together with all of its job runs
pub async fn save(pool: &PgPool, run: &PipelineRun) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    upsert_pipeline_run(&mut *tx, run).await?;
    for job_run in &run.job_runs {
        upsert_job_run(&mut *tx, job_run).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Insert or update the pipeline run header
pub async fn upsert_pipeline_run<'e, E>(executor: E, run: &PipelineRun) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO pipeline_runs (id, pipeline_id, status, started_at, ended_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            started_at = EXCLUDED.started_at,
            ended_at = EXCLUDED.ended_at
        "#,
    )
    .bind(run.id)
    .bind(run.pipeline_id)
    .bind(run.status.as_str())
    .bind(run.started_at)
    .bind(run.ended_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Insert or update a single job run
pub async fn upsert_job_run<'e, E>(executor: E, job_run: &JobRun) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO job_runs (id, job_id, pipeline_run_id, order_index, status, logs, started_at, ended_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (id) DO UPDATE
        SET status = EXCLUDED.status,
            logs = EXCLUDED.logs,
            started_at = EXCLUDED.started_at,
            ended_at = EXCLUDED.ended_at
        "#,
    )
    .bind(job_run.id)
    .bind(job_run.job_id)
    .bind(job_run.pipeline_run_id)
    .bind(job_run.order_index)
    .bind(job_run.status.as_str())
    .bind(&job_run.logs)
    .bind(job_run.started_at)
    .bind(job_run.ended_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Find a pipeline run by ID, with its job runs in execution order
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<PipelineRun>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRunRow>(
        r#"
        SELECT id, pipeline_id, status, started_at, ended_at
        FROM pipeline_runs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut run = PipelineRun::try_from(row)?;
    run.job_runs = find_job_runs_by_run(pool, id).await?;
    Ok(Some(run))
}

/// Find the runs of a pipeline, most recent first
pub async fn find_by_pipeline(
    pool: &PgPool,
    pipeline_id: Uuid,
) -> Result<Vec<PipelineRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineRunRow>(
        r#"
        SELECT id, pipeline_id, status, started_at, ended_at
        FROM pipeline_runs
        WHERE pipeline_id = $1
        ORDER BY started_at DESC NULLS LAST
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    let job_run_rows = sqlx::query_as::<_, JobRunRow>(
        r#"
        SELECT jr.id, jr.job_id, jr.pipeline_run_id, jr.order_index, jr.status, jr.logs,
               jr.started_at, jr.ended_at
        FROM job_runs jr
        JOIN pipeline_runs pr ON pr.id = jr.pipeline_run_id
        WHERE pr.pipeline_id = $1
        ORDER BY jr.order_index ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    let mut job_runs: HashMap<Uuid, Vec<JobRun>> = HashMap::new();
    for row in job_run_rows {
        let job_run = JobRun::try_from(row)?;
        job_runs
            .entry(job_run.pipeline_run_id)
            .or_default()
            .push(job_run);
    }

    rows.into_iter()
        .map(|row| {
            let mut run = PipelineRun::try_from(row)?;
            run.job_runs = job_runs.remove(&run.id).unwrap_or_default();
            Ok(run)
        })
        .collect()
}

/// Find all pipeline runs with the given status, with their job runs
pub async fn find_by_status(
    pool: &PgPool,
    status: PipelineStatus,
) -> Result<Vec<PipelineRun>, sqlx::Error> {
    let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM pipeline_runs WHERE status = $1")
        .bind(status.as_str())
        .fetch_all(pool)
        .await?;

    let mut runs = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(run) = find_by_id(pool, id).await? {
            runs.push(run);
        }
    }

    Ok(runs)
}

/// Find all job runs created from a job template, most recent first
pub async fn find_job_runs_by_job(pool: &PgPool, job_id: Uuid) -> Result<Vec<JobRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRunRow>(
        r#"
        SELECT id, job_id, pipeline_run_id, order_index, status, logs, started_at, ended_at
        FROM job_runs
        WHERE job_id = $1
        ORDER BY started_at DESC NULLS LAST
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobRun::try_from).collect()
}

async fn find_job_runs_by_run(pool: &PgPool, pipeline_run_id: Uuid) -> Result<Vec<JobRun>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRunRow>(
        r#"
        SELECT id, job_id, pipeline_run_id, order_index, status, logs, started_at, ended_at
        FROM job_runs
        WHERE pipeline_run_id = $1
        ORDER BY order_index ASC
        "#,
    )
    .bind(pipeline_run_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(JobRun::try_from).collect()
}

/// Delete a pipeline run and its job runs
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM job_runs WHERE pipeline_run_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM pipeline_runs WHERE id = $1")
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
struct PipelineRunRow {
    id: Uuid,
    pipeline_id: Uuid,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<PipelineRunRow> for PipelineRun {
    type Error = sqlx::Error;

    fn try_from(row: PipelineRunRow) -> Result<Self, Self::Error> {
        Ok(PipelineRun {
            id: row.id,
            pipeline_id: row.pipeline_id,
            status: row.status.parse::<PipelineStatus>().map_err(decode_error)?,
            started_at: row.started_at,
            ended_at: row.ended_at,
            job_runs: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRunRow {
    id: Uuid,
    job_id: Uuid,
    pipeline_run_id: Uuid,
    order_index: i32,
    status: String,
    logs: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRunRow> for JobRun {
    type Error = sqlx::Error;

    fn try_from(row: JobRunRow) -> Result<Self, Self::Error> {
        Ok(JobRun {
            id: row.id,
            job_id: row.job_id,
            pipeline_run_id: row.pipeline_run_id,
            order_index: row.order_index,
            status: row.status.parse::<JobStatus>().map_err(decode_error)?,
            logs: row.logs,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}

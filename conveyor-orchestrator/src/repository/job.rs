//! Job Repository
//!
//! Handles all database operations related to job templates.

use conveyor_core::domain::job::Job;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::decode_error;

/// Insert a job template
///
/// Takes any executor so pipeline creation can insert its jobs inside
/// its own transaction.
pub async fn insert<'e, E>(executor: E, job: &Job) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO jobs (id, pipeline_id, name, image, command, env, order_index, timeout_sec)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(job.id)
    .bind(job.pipeline_id)
    .bind(&job.name)
    .bind(&job.image)
    .bind(&job.command)
    .bind(Json(&job.env))
    .bind(job.order_index)
    .bind(i64::from(job.timeout_sec))
    .execute(executor)
    .await?;

    Ok(())
}

/// Find a job template by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, pipeline_id, name, image, command, env, order_index, timeout_sec
        FROM jobs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

/// Find the job templates of a pipeline, in execution order
pub async fn find_by_pipeline(pool: &PgPool, pipeline_id: Uuid) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, pipeline_id, name, image, command, env, order_index, timeout_sec
        FROM jobs
        WHERE pipeline_id = $1
        ORDER BY order_index ASC
        "#,
    )
    .bind(pipeline_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// List all job templates
pub async fn list_all(pool: &PgPool) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT id, pipeline_id, name, image, command, env, order_index, timeout_sec
        FROM jobs
        ORDER BY pipeline_id, order_index ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

// =============================================================================
// Internal types for database mapping
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    pipeline_id: Uuid,
    name: String,
    image: String,
    command: String,
    env: Json<BTreeMap<String, String>>,
    order_index: i32,
    timeout_sec: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = sqlx::Error;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            pipeline_id: row.pipeline_id,
            name: row.name,
            image: row.image,
            command: row.command,
            env: row.env.0,
            order_index: row.order_index,
            timeout_sec: u32::try_from(row.timeout_sec).map_err(decode_error)?,
        })
    }
}

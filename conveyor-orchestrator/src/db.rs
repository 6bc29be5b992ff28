use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Creates the schema
///
/// Foreign keys carry no `ON DELETE CASCADE`: the repositories delete
/// children explicitly, inside the same transaction as their parent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job templates table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id),
            name VARCHAR(255) NOT NULL,
            image VARCHAR(255) NOT NULL,
            command TEXT NOT NULL,
            env JSONB NOT NULL DEFAULT '{}',
            order_index INTEGER NOT NULL,
            timeout_sec BIGINT NOT NULL DEFAULT 3600,
            UNIQUE (pipeline_id, order_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create pipeline runs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            id UUID PRIMARY KEY,
            pipeline_id UUID NOT NULL REFERENCES pipelines(id),
            status VARCHAR(20) NOT NULL,
            started_at TIMESTAMPTZ,
            ended_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create job runs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_runs (
            id UUID PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id),
            pipeline_run_id UUID NOT NULL REFERENCES pipeline_runs(id),
            order_index INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            logs TEXT NOT NULL DEFAULT '',
            started_at TIMESTAMPTZ,
            ended_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_pipeline_id ON jobs(pipeline_id, order_index)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline_id ON pipeline_runs(pipeline_id, started_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_job_runs_job_id ON job_runs(job_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_runs_pipeline_run_id ON job_runs(pipeline_run_id, order_index)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

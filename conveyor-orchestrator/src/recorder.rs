//! Postgres run recorder
//!
//! Persists every run transition reported by the coordinator.

use anyhow::Context;
use async_trait::async_trait;
use conveyor_core::domain::run::{JobRun, PipelineRun};
use conveyor_runner::RunRecorder;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::run_repository;

#[derive(Clone)]
pub struct PgRunRecorder {
    pool: PgPool,
}

impl PgRunRecorder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRecorder for PgRunRecorder {
    async fn record_pipeline_run(&self, run: &PipelineRun) -> anyhow::Result<()> {
        run_repository::save(&self.pool, run)
            .await
            .with_context(|| format!("Failed to save pipeline run {}", run.id))?;

        tracing::debug!("Recorded pipeline run {} as {}", run.id, run.status);
        Ok(())
    }

    async fn record_job_run(&self, job_run: &JobRun) -> anyhow::Result<()> {
        run_repository::upsert_job_run(&self.pool, job_run)
            .await
            .with_context(|| format!("Failed to save job run {}", job_run.id))?;

        tracing::debug!("Recorded job run {} as {}", job_run.id, job_run.status);
        Ok(())
    }

    async fn load_pipeline_run(&self, id: Uuid) -> anyhow::Result<Option<PipelineRun>> {
        let run = run_repository::find_by_id(&self.pool, id)
            .await
            .with_context(|| format!("Failed to load pipeline run {}", id))?;

        Ok(run)
    }
}

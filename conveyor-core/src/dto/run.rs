//! Run DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::run::{JobRun, PipelineRun};
use crate::domain::status::{JobStatus, PipelineStatus};

/// Job run as returned by the API, with its computed duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRunView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub pipeline_run_id: Uuid,
    pub order_index: i32,
    pub status: JobStatus,
    pub logs: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
}

impl From<JobRun> for JobRunView {
    fn from(job_run: JobRun) -> Self {
        let duration_seconds = job_run.duration_seconds();
        Self {
            id: job_run.id,
            job_id: job_run.job_id,
            pipeline_run_id: job_run.pipeline_run_id,
            order_index: job_run.order_index,
            status: job_run.status,
            logs: job_run.logs,
            started_at: job_run.started_at,
            ended_at: job_run.ended_at,
            duration_seconds,
        }
    }
}

/// Pipeline run as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunView {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub job_runs: Vec<JobRunView>,
}

impl From<PipelineRun> for PipelineRunView {
    fn from(run: PipelineRun) -> Self {
        let duration_seconds = run.duration_seconds();
        Self {
            id: run.id,
            pipeline_id: run.pipeline_id,
            status: run.status,
            started_at: run.started_at,
            ended_at: run.ended_at,
            duration_seconds,
            job_runs: run.job_runs.into_iter().map(JobRunView::from).collect(),
        }
    }
}

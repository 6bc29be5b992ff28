//! Run record domain types
//!
//! A [`PipelineRun`] is one execution attempt of a pipeline and owns one
//! [`JobRun`] per job template. Transitions are guarded here so a status can
//! only move forward: PENDING -> RUNNING -> final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::Job;
use crate::domain::log;
use crate::domain::status::{self, JobStatus, PipelineStatus};

/// Rejected status transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{entity} {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub id: Uuid,
    pub from: String,
    pub to: String,
}

/// Execution attempt of a single job within a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: Uuid,
    pub job_id: Uuid,
    pub pipeline_run_id: Uuid,
    /// Copied from the job template so ordering never depends on storage order
    pub order_index: i32,
    pub status: JobStatus,
    #[serde(default)]
    pub logs: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobRun {
    pub fn new(job: &Job, pipeline_run_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: job.id,
            pipeline_run_id,
            order_index: job.order_index,
            status: JobStatus::Pending,
            logs: String::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// PENDING -> RUNNING, stamping `started_at`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status != JobStatus::Pending {
            return Err(self.transition_error(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// RUNNING -> SUCCESS | FAILED, stamping `ended_at`
    pub fn finish(&mut self, final_status: JobStatus) -> Result<(), TransitionError> {
        if !status::is_running(self.status) || !status::is_final(final_status) {
            return Err(self.transition_error(final_status));
        }
        self.status = final_status;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Appends a single log line
    pub fn append_log(&mut self, line: &str) {
        log::append_in_place(&mut self.logs, line);
    }

    /// Appends a chunk of streamed output, possibly spanning several lines
    pub fn append_logs(&mut self, chunk: &str) {
        log::append_in_place(&mut self.logs, chunk);
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        duration_seconds(self.started_at, self.ended_at)
    }

    pub fn is_running(&self) -> bool {
        status::is_running(self.status)
    }

    pub fn is_finished(&self) -> bool {
        status::is_final(self.status)
    }

    pub fn is_successful(&self) -> bool {
        self.status == JobStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    fn transition_error(&self, to: JobStatus) -> TransitionError {
        TransitionError {
            entity: "job run",
            id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

/// Execution attempt of a whole pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: PipelineStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// One entry per job template, in `order_index` order
    pub job_runs: Vec<JobRun>,
}

impl PipelineRun {
    /// Creates a PENDING run with a PENDING job run for every job in `jobs`
    pub fn new(pipeline_id: Uuid, jobs: &[Job]) -> Self {
        let id = Uuid::new_v4();
        let mut job_runs: Vec<JobRun> = jobs.iter().map(|job| JobRun::new(job, id)).collect();
        job_runs.sort_by_key(|job_run| job_run.order_index);

        Self {
            id,
            pipeline_id,
            status: PipelineStatus::Pending,
            started_at: None,
            ended_at: None,
            job_runs,
        }
    }

    /// PENDING -> RUNNING, stamping `started_at`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if self.status != PipelineStatus::Pending {
            return Err(self.transition_error(PipelineStatus::Running));
        }
        self.status = PipelineStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// RUNNING -> SUCCESS | FAILED | CANCELLED, stamping `ended_at`
    pub fn finish(&mut self, final_status: PipelineStatus) -> Result<(), TransitionError> {
        if !status::is_running(self.status) || !status::is_final(final_status) {
            return Err(self.transition_error(final_status));
        }
        self.status = final_status;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.finish(PipelineStatus::Cancelled)
    }

    /// The job run currently executing, if any
    pub fn running_job_run_mut(&mut self) -> Option<&mut JobRun> {
        self.job_runs.iter_mut().find(|job_run| job_run.is_running())
    }

    pub fn job_run_mut(&mut self, id: Uuid) -> Option<&mut JobRun> {
        self.job_runs.iter_mut().find(|job_run| job_run.id == id)
    }

    /// Sorts job runs by `order_index`; used after loading from storage
    pub fn sort_job_runs(&mut self) {
        self.job_runs.sort_by_key(|job_run| job_run.order_index);
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        duration_seconds(self.started_at, self.ended_at)
    }

    pub fn is_running(&self) -> bool {
        status::is_running(self.status)
    }

    pub fn is_finished(&self) -> bool {
        status::is_final(self.status)
    }

    fn transition_error(&self, to: PipelineStatus) -> TransitionError {
        TransitionError {
            entity: "pipeline run",
            id: self.id,
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }
}

fn duration_seconds(started_at: Option<DateTime<Utc>>, ended_at: Option<DateTime<Utc>>) -> Option<i64> {
    match (started_at, ended_at) {
        (Some(start), Some(end)) => Some((end - start).num_seconds()),
        _ => None,
    }
}

//! Job executor contract
//!
//! The coordinator hands one job at a time to a [`JobExecutor`]. Output is
//! streamed back through a channel while the job runs; the returned
//! [`ExecutionOutcome`] only says how it ended.

pub mod podman;

use async_trait::async_trait;
use conveyor_core::domain::job::Job;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Channel receiving incremental job output
pub type LogChunkSender = mpsc::UnboundedSender<String>;

/// Everything an executor needs to run one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub job_run_id: Uuid,
    pub job_name: String,
    pub image: String,
    pub command: String,
    pub env: BTreeMap<String, String>,
}

impl ExecutionRequest {
    pub fn for_job(job: &Job, job_run_id: Uuid) -> Self {
        Self {
            job_run_id,
            job_name: job.name.clone(),
            image: job.image.clone(),
            command: job.command.clone(),
            env: job.env.clone(),
        }
    }
}

/// How a single execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The command ran to completion with this exit code
    Completed { exit_code: i32 },
    /// The container could not be launched or run
    ExecutionError { reason: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { exit_code: 0 })
    }
}

/// Runs one job in a container
///
/// Implementations must watch `cancel` and stop the underlying execution
/// when it fires. Stopping is best effort; the coordinator never waits on it
/// before settling the job run.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(
        &self,
        request: ExecutionRequest,
        log_chunks: LogChunkSender,
        cancel: CancellationToken,
    ) -> ExecutionOutcome;
}

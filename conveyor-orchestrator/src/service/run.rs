//! Run Service
//!
//! Starts, inspects, cancels and deletes pipeline runs.
//!
//! Runs being driven by the coordinator are served from its live state;
//! everything else comes from the database.

use conveyor_core::domain::run::{PipelineRun, TransitionError};
use conveyor_core::domain::status::{JobStatus, PipelineStatus};
use conveyor_runner::{CoordinatorError, PipelineRunCoordinator, RunHandle};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{pipeline_repository, run_repository};

/// Service error type
#[derive(Debug)]
pub enum RunError {
    NotFound(Uuid),
    PipelineNotFound(Uuid),
    EmptyPipeline(Uuid),
    InvalidState(String),
    DatabaseError(sqlx::Error),
    CoordinatorError(CoordinatorError),
}

impl From<sqlx::Error> for RunError {
    fn from(err: sqlx::Error) -> Self {
        RunError::DatabaseError(err)
    }
}

impl From<CoordinatorError> for RunError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::EmptyPipeline(id) => RunError::EmptyPipeline(id),
            CoordinatorError::InvalidState(msg) => RunError::InvalidState(msg),
            other => RunError::CoordinatorError(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, RunError>;

/// Log line of a job run cut short by an orchestrator restart
pub const INTERRUPTED_REASON: &str = "interrupted: orchestrator stopped while the job was running";

/// Create a run of a pipeline and start driving it
///
/// Returns as soon as the run is RUNNING; the jobs execute in the background.
pub async fn start_run(
    pool: &PgPool,
    coordinator: &PipelineRunCoordinator,
    pipeline_id: Uuid,
) -> Result<PipelineRun> {
    let pipeline = pipeline_repository::find_definition(pool, pipeline_id)
        .await?
        .ok_or(RunError::PipelineNotFound(pipeline_id))?;

    let run = coordinator.create_run(&pipeline).await?;
    let handle = coordinator.start(&pipeline, run).await?;
    let snapshot = handle.snapshot().await;

    tokio::spawn(watch_run(handle));

    Ok(snapshot)
}

/// Get a run, live if it is still being driven
pub async fn get_run(
    pool: &PgPool,
    coordinator: &PipelineRunCoordinator,
    id: Uuid,
) -> Result<PipelineRun> {
    if let Some(run) = coordinator.snapshot(id).await {
        return Ok(run);
    }

    let run = run_repository::find_by_id(pool, id)
        .await?
        .ok_or(RunError::NotFound(id))?;

    Ok(run)
}

/// List the runs of a pipeline, most recent first
pub async fn list_runs(pool: &PgPool, pipeline_id: Uuid) -> Result<Vec<PipelineRun>> {
    if !pipeline_repository::exists(pool, pipeline_id).await? {
        return Err(RunError::PipelineNotFound(pipeline_id));
    }

    let runs = run_repository::find_by_pipeline(pool, pipeline_id).await?;
    Ok(runs)
}

/// Cancel a RUNNING run
pub async fn cancel_run(coordinator: &PipelineRunCoordinator, id: Uuid) -> Result<PipelineRun> {
    match coordinator.cancel(id).await {
        Ok(run) => {
            tracing::info!("Pipeline run {} cancelled", id);
            Ok(run)
        }
        Err(e) if e.is_not_found() => Err(RunError::NotFound(id)),
        Err(e) => Err(e.into()),
    }
}

/// Fail runs left RUNNING by a previous orchestrator process
///
/// Nothing drives them any more, so each one is settled FAILED with the
/// interrupted job run logging [`INTERRUPTED_REASON`].
pub async fn recover_interrupted_runs(pool: &PgPool) -> Result<usize> {
    let runs = run_repository::find_by_status(pool, PipelineStatus::Running).await?;
    let count = runs.len();

    for mut run in runs {
        settle_interrupted(&mut run).map_err(CoordinatorError::from)?;
        run_repository::save(pool, &run).await?;
        tracing::warn!("Pipeline run {} was interrupted, marked FAILED", run.id);
    }

    Ok(count)
}

fn settle_interrupted(run: &mut PipelineRun) -> std::result::Result<(), TransitionError> {
    if let Some(job_run) = run.running_job_run_mut() {
        job_run.append_log(INTERRUPTED_REASON);
        job_run.finish(JobStatus::Failed)?;
    }
    run.finish(PipelineStatus::Failed)
}

/// Delete a run and its job runs
pub async fn delete_run(
    pool: &PgPool,
    coordinator: &PipelineRunCoordinator,
    id: Uuid,
) -> Result<()> {
    if coordinator.is_active(id).await {
        return Err(RunError::InvalidState(format!(
            "pipeline run {} is still running, cancel it first",
            id
        )));
    }

    let deleted = run_repository::delete(pool, id).await?;

    if !deleted {
        return Err(RunError::NotFound(id));
    }

    tracing::info!("Pipeline run deleted: {}", id);

    Ok(())
}

/// Logs how a background run ended
async fn watch_run(handle: RunHandle) {
    let run_id = handle.id();

    match handle.wait().await {
        Ok(run) => tracing::info!("Pipeline run {} finished: {}", run_id, run.status),
        Err(e) => tracing::error!("Pipeline run {} aborted: {}", run_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_core::domain::job::Job;

    fn running_run() -> PipelineRun {
        let pipeline_id = Uuid::new_v4();
        let jobs = vec![
            Job::new(pipeline_id, "build", "alpine", "make", 0),
            Job::new(pipeline_id, "test", "alpine", "make test", 1),
            Job::new(pipeline_id, "deploy", "alpine", "make deploy", 2),
        ];
        let mut run = PipelineRun::new(pipeline_id, &jobs);
        run.start().unwrap();
        run.job_runs[0].start().unwrap();
        run.job_runs[0].finish(JobStatus::Success).unwrap();
        run.job_runs[1].start().unwrap();
        run.job_runs[1].append_log("compiling");
        run
    }

    #[test]
    fn test_settle_interrupted_run() {
        let mut run = running_run();

        settle_interrupted(&mut run).unwrap();

        assert_eq!(run.status, PipelineStatus::Failed);
        assert!(run.ended_at.is_some());
        let statuses: Vec<JobStatus> = run.job_runs.iter().map(|j| j.status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Success, JobStatus::Failed, JobStatus::Pending]
        );
        assert_eq!(
            run.job_runs[1].logs,
            format!("compiling\n{}", INTERRUPTED_REASON)
        );
        assert!(run.job_runs[1].ended_at.is_some());
        assert!(run.job_runs[2].started_at.is_none());
    }

    #[test]
    fn test_settle_interrupted_between_jobs() {
        let mut run = running_run();
        run.job_runs[1].finish(JobStatus::Success).unwrap();

        settle_interrupted(&mut run).unwrap();

        assert_eq!(run.status, PipelineStatus::Failed);
        assert!(!run.job_runs[1].logs.contains(INTERRUPTED_REASON));
    }

    #[test]
    fn test_coordinator_error_mapping() {
        let id = Uuid::new_v4();

        assert!(matches!(
            RunError::from(CoordinatorError::EmptyPipeline(id)),
            RunError::EmptyPipeline(got) if got == id
        ));
        assert!(matches!(
            RunError::from(CoordinatorError::InvalidState("done".to_string())),
            RunError::InvalidState(_)
        ));
        assert!(matches!(
            RunError::from(CoordinatorError::Recorder(anyhow::anyhow!("db down"))),
            RunError::CoordinatorError(CoordinatorError::Recorder(_))
        ));
    }
}

//! Job Service
//!
//! Read access to job templates and the runs created from them.

use conveyor_core::domain::job::Job;
use conveyor_core::domain::run::JobRun;
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::{job_repository, run_repository};

/// Service error type
#[derive(Debug)]
pub enum JobError {
    NotFound(Uuid),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::DatabaseError(err)
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// List all job templates
pub async fn list_jobs(pool: &PgPool) -> Result<Vec<Job>> {
    let jobs = job_repository::list_all(pool).await?;
    Ok(jobs)
}

/// Get a job template by ID
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Job> {
    let job = job_repository::find_by_id(pool, id)
        .await?
        .ok_or(JobError::NotFound(id))?;

    Ok(job)
}

/// List the job runs created from a job template
pub async fn list_job_runs(pool: &PgPool, job_id: Uuid) -> Result<Vec<JobRun>> {
    // Distinguish "no runs yet" from "no such job"
    get_job(pool, job_id).await?;

    let job_runs = run_repository::find_job_runs_by_job(pool, job_id).await?;
    Ok(job_runs)
}

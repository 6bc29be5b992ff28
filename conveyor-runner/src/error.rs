//! Error types for run coordination

use conveyor_core::domain::run::TransitionError;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;

/// Errors surfaced by the coordinator
///
/// `Execution` and `Timeout` describe why a job run failed; the drive loop
/// records them in the job's log and they never escape a run. The remaining
/// variants are returned to callers.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Pipeline, job or run lookup failed
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Operation attempted from a disallowed status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Pipeline has no job templates to run
    #[error("pipeline {0} has no jobs to run")]
    EmptyPipeline(Uuid),

    /// Executor failed to launch or run the container
    #[error("execution error: {0}")]
    Execution(String),

    /// Job exceeded its configured timeout
    #[error("timeout after {0}s")]
    Timeout(u32),

    /// Run state could not be persisted
    #[error("failed to record run state: {0:#}")]
    Recorder(anyhow::Error),

    /// Drive task ended abnormally
    #[error("run task failed: {0}")]
    Internal(String),
}

impl CoordinatorError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<TransitionError> for CoordinatorError {
    fn from(err: TransitionError) -> Self {
        CoordinatorError::InvalidState(err.to_string())
    }
}

impl From<tokio::task::JoinError> for CoordinatorError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoordinatorError::Internal(err.to_string())
    }
}

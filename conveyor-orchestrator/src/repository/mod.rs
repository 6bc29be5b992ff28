//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific domain entity.

pub mod job;
pub mod pipeline;
pub mod run;

// Re-export for convenience
pub use job as job_repository;
pub use pipeline as pipeline_repository;
pub use run as run_repository;

/// Wraps a column value that does not map onto a domain type
pub(crate) fn decode_error<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}

//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories, the run coordinator and
//! domain validation.

pub mod job;
pub mod pipeline;
pub mod run;

// Re-export for convenience
pub use job as job_service;
pub use pipeline as pipeline_service;
pub use run as run_service;

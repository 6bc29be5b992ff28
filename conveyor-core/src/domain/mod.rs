//! Core domain types
//!
//! This module contains the core domain structures used across Conveyor services.
//! Templates (pipelines and jobs) are owned by the orchestrator, run records are
//! mutated only by the runner's coordinator and persisted by the orchestrator.

pub mod job;
pub mod log;
pub mod pipeline;
pub mod run;
pub mod status;

//! Data Transfer Objects for the orchestrator API
//!
//! DTOs are lightweight representations of domain entities shaped for
//! requests and responses rather than for execution.

pub mod pipeline;
pub mod run;

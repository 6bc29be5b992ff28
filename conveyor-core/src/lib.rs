//! Conveyor Core
//!
//! Core types and abstractions for the Conveyor CI/CD system.
//!
//! This crate contains:
//! - Domain types: Pipeline and Job templates, PipelineRun and JobRun records
//! - Status model and log accumulation rules shared by every component
//! - DTOs: Data transfer objects for the orchestrator API

pub mod domain;
pub mod dto;

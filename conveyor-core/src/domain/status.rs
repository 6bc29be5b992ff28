//! Run status model
//!
//! Finite-state semantics for job and pipeline run statuses. The terminal
//! states of each enumeration are declared once, on the [`RunStatus`] impl,
//! and every other component branches through [`is_final`] / [`is_running`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a single job execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Status of a pipeline execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// Shared shape of both status enumerations
pub trait RunStatus: Copy + PartialEq + 'static {
    /// States a run never leaves once reached
    const FINAL: &'static [Self];
    /// The single in-progress state
    const RUNNING: Self;
}

impl RunStatus for JobStatus {
    const FINAL: &'static [Self] = &[JobStatus::Success, JobStatus::Failed];
    const RUNNING: Self = JobStatus::Running;
}

impl RunStatus for PipelineStatus {
    const FINAL: &'static [Self] = &[
        PipelineStatus::Success,
        PipelineStatus::Failed,
        PipelineStatus::Cancelled,
    ];
    const RUNNING: Self = PipelineStatus::Running;
}

/// Returns true when `status` is terminal
pub fn is_final<S: RunStatus>(status: S) -> bool {
    S::FINAL.contains(&status)
}

/// Returns true only for the running state
pub fn is_running<S: RunStatus>(status: S) -> bool {
    status == S::RUNNING
}

/// Error returned when a persisted status string is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(pub String);

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Success => "SUCCESS",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Pending => "PENDING",
            PipelineStatus::Running => "RUNNING",
            PipelineStatus::Success => "SUCCESS",
            PipelineStatus::Failed => "FAILED",
            PipelineStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "SUCCESS" => Ok(JobStatus::Success),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl FromStr for PipelineStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PipelineStatus::Pending),
            "RUNNING" => Ok(PipelineStatus::Running),
            "SUCCESS" => Ok(PipelineStatus::Success),
            "FAILED" => Ok(PipelineStatus::Failed),
            "CANCELLED" => Ok(PipelineStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_final_states() {
        assert!(!is_final(JobStatus::Pending));
        assert!(!is_final(JobStatus::Running));
        assert!(is_final(JobStatus::Success));
        assert!(is_final(JobStatus::Failed));
    }

    #[test]
    fn test_pipeline_final_states() {
        assert!(!is_final(PipelineStatus::Pending));
        assert!(!is_final(PipelineStatus::Running));
        assert!(is_final(PipelineStatus::Success));
        assert!(is_final(PipelineStatus::Failed));
        assert!(is_final(PipelineStatus::Cancelled));
    }

    #[test]
    fn test_is_running() {
        assert!(is_running(JobStatus::Running));
        assert!(is_running(PipelineStatus::Running));
        assert!(!is_running(JobStatus::Pending));
        assert!(!is_running(PipelineStatus::Cancelled));
    }

    #[test]
    fn test_status_text_form() {
        assert_eq!("CANCELLED".parse::<PipelineStatus>(), Ok(PipelineStatus::Cancelled));
        assert_eq!(JobStatus::Success.to_string(), "SUCCESS");
        assert!("CANCELLED".parse::<JobStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&PipelineStatus::Running).unwrap(),
            "\"RUNNING\""
        );
    }
}

//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::job::{DEFAULT_TIMEOUT_SEC, Job};
use crate::domain::pipeline::Pipeline;

/// Request to create a new pipeline together with its job templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub jobs: Vec<CreateJob>,
}

/// Job template inside a [`CreatePipeline`] request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub name: String,
    pub image: String,
    pub command: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub order_index: i32,
    /// Defaults to [`DEFAULT_TIMEOUT_SEC`]
    pub timeout_sec: Option<u32>,
}

impl CreateJob {
    /// Builds the job template owned by `pipeline_id`
    pub fn into_job(self, pipeline_id: Uuid) -> Job {
        let mut job = Job::new(pipeline_id, self.name, self.image, self.command, self.order_index)
            .with_timeout(self.timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC));
        job.env = self.env;
        job
    }
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub job_count: usize,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            name: pipeline.name.clone(),
            description: pipeline.description.clone(),
            created_at: pipeline.created_at,
            updated_at: pipeline.updated_at,
            job_count: pipeline.jobs.len(),
        }
    }
}

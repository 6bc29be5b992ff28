//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::Job;
use crate::domain::run::PipelineRun;

/// Pipeline definition
///
/// Named template of an ordered job sequence. Owns its jobs and its past runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Job templates, ascending `order_index`
    #[serde(default)]
    pub jobs: Vec<Job>,
    /// Past runs, most recent first
    #[serde(default)]
    pub runs: Vec<PipelineRun>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description,
            created_at: now,
            updated_at: now,
            jobs: Vec::new(),
            runs: Vec::new(),
        }
    }

    /// Adds a job template, re-parenting it to this pipeline
    pub fn add_job(&mut self, mut job: Job) {
        job.pipeline_id = self.id;
        self.jobs.push(job);
        self.sort_jobs();
    }

    pub fn remove_job(&mut self, job_id: Uuid) -> Option<Job> {
        let position = self.jobs.iter().position(|job| job.id == job_id)?;
        Some(self.jobs.remove(position))
    }

    pub fn job(&self, job_id: Uuid) -> Option<&Job> {
        self.jobs.iter().find(|job| job.id == job_id)
    }

    /// Orders jobs by `order_index` and runs by `started_at`, newest first.
    ///
    /// Runs that never started sort after every started run.
    pub fn sort_children(&mut self) {
        self.sort_jobs();
        self.runs
            .sort_by(|a, b| match (a.started_at, b.started_at) {
                (Some(a), Some(b)) => b.cmp(&a),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        for run in &mut self.runs {
            run.sort_job_runs();
        }
    }

    fn sort_jobs(&mut self) {
        self.jobs.sort_by_key(|job| job.order_index);
    }
}

//! Run state recording
//!
//! The coordinator reports every transition to a [`RunRecorder`] while it
//! holds the run's lock, so recorded snapshots arrive in transition order.
//! A recorder error is an infrastructure failure and aborts the run.

use async_trait::async_trait;
use conveyor_core::domain::run::{JobRun, PipelineRun};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Persistence hook for run state
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Stores the pipeline run header and all of its job runs
    async fn record_pipeline_run(&self, run: &PipelineRun) -> anyhow::Result<()>;

    /// Stores a single job run
    async fn record_job_run(&self, job_run: &JobRun) -> anyhow::Result<()>;

    /// Latest stored state of a run, `None` if it was never recorded
    async fn load_pipeline_run(&self, id: Uuid) -> anyhow::Result<Option<PipelineRun>>;
}

/// In-memory implementation of RunRecorder
///
/// Keeps the latest snapshot of every recorded run.
#[derive(Clone, Default)]
pub struct InMemoryRecorder {
    runs: Arc<Mutex<HashMap<Uuid, PipelineRun>>>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest recorded snapshot of a run
    pub async fn pipeline_run(&self, id: Uuid) -> Option<PipelineRun> {
        self.runs.lock().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.runs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.runs.lock().await.is_empty()
    }
}

#[async_trait]
impl RunRecorder for InMemoryRecorder {
    async fn record_pipeline_run(&self, run: &PipelineRun) -> anyhow::Result<()> {
        self.runs.lock().await.insert(run.id, run.clone());
        Ok(())
    }

    async fn record_job_run(&self, job_run: &JobRun) -> anyhow::Result<()> {
        let mut runs = self.runs.lock().await;
        let stored = runs
            .get_mut(&job_run.pipeline_run_id)
            .and_then(|run| run.job_run_mut(job_run.id))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "job run {} belongs to unrecorded pipeline run {}",
                    job_run.id,
                    job_run.pipeline_run_id
                )
            })?;
        *stored = job_run.clone();
        Ok(())
    }

    async fn load_pipeline_run(&self, id: Uuid) -> anyhow::Result<Option<PipelineRun>> {
        Ok(self.pipeline_run(id).await)
    }
}

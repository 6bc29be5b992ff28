//! Pipeline run coordination
//!
//! Drives a pipeline run's job runs strictly in `order_index` order:
//! - One job run RUNNING at a time, the next one starts only after the
//!   previous one reached a final state
//! - Each execution bounded by a [`TimeoutWatchdog`]
//! - Fail-fast on the first failed, timed out or cancelled job
//!
//! Every run is driven by its own task. The run's state sits behind a lock
//! shared by that task and every [`RunControl`]; transitions (and their
//! recording) happen under the lock, so a cancellation and a job outcome
//! racing each other always have exactly one winner.

use conveyor_core::domain::job::Job;
use conveyor_core::domain::pipeline::Pipeline;
use conveyor_core::domain::run::PipelineRun;
use conveyor_core::domain::status::{JobStatus, PipelineStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoordinatorError, Result};
use crate::executor::{ExecutionOutcome, ExecutionRequest, JobExecutor};
use crate::recorder::RunRecorder;
use crate::watchdog::TimeoutWatchdog;

/// Log line recorded on a job run stopped by cancellation
pub const CANCELLED_REASON: &str = "cancelled";

type ActiveRuns = Arc<Mutex<HashMap<Uuid, RunControl>>>;

/// Creates, starts and cancels pipeline runs
#[derive(Clone)]
pub struct PipelineRunCoordinator {
    executor: Arc<dyn JobExecutor>,
    recorder: Arc<dyn RunRecorder>,
    active: ActiveRuns,
}

impl PipelineRunCoordinator {
    pub fn new(executor: Arc<dyn JobExecutor>, recorder: Arc<dyn RunRecorder>) -> Self {
        Self {
            executor,
            recorder,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Builds a PENDING run with one PENDING job run per job template
    ///
    /// A pipeline without jobs is rejected and nothing is recorded.
    pub async fn create_run(&self, pipeline: &Pipeline) -> Result<PipelineRun> {
        if pipeline.jobs.is_empty() {
            return Err(CoordinatorError::EmptyPipeline(pipeline.id));
        }

        let run = PipelineRun::new(pipeline.id, &pipeline.jobs);
        self.recorder
            .record_pipeline_run(&run)
            .await
            .map_err(CoordinatorError::Recorder)?;

        info!(
            "Created run {} for pipeline {} with {} job(s)",
            run.id,
            pipeline.name,
            run.job_runs.len()
        );

        Ok(run)
    }

    /// Moves a PENDING run to RUNNING and spawns its drive task
    ///
    /// The recorded state decides, not the caller's copy: a run that is
    /// already being driven, or whose recorded status is no longer PENDING,
    /// is rejected with `InvalidState`. A run that was never recorded yields
    /// `NotFound`.
    pub async fn start(&self, pipeline: &Pipeline, mut run: PipelineRun) -> Result<RunHandle> {
        if run.pipeline_id != pipeline.id {
            return Err(CoordinatorError::InvalidState(format!(
                "pipeline run {} belongs to pipeline {}, not {}",
                run.id, run.pipeline_id, pipeline.id
            )));
        }

        // Held until the run is registered, so two starts of one run serialize
        let mut active = self.active.lock().await;
        if active.contains_key(&run.id) {
            return Err(CoordinatorError::InvalidState(format!(
                "pipeline run {} is already running",
                run.id
            )));
        }

        let recorded = self
            .recorder
            .load_pipeline_run(run.id)
            .await
            .map_err(CoordinatorError::Recorder)?
            .ok_or_else(|| CoordinatorError::not_found("pipeline run", run.id))?;
        if recorded.status != PipelineStatus::Pending {
            return Err(CoordinatorError::InvalidState(format!(
                "pipeline run {} is {}, only PENDING runs can be started",
                run.id, recorded.status
            )));
        }

        let plan = plan_jobs(pipeline, &run)?;
        run.start()?;
        self.recorder
            .record_pipeline_run(&run)
            .await
            .map_err(CoordinatorError::Recorder)?;

        let run_id = run.id;
        let control = RunControl {
            id: run_id,
            state: Arc::new(Mutex::new(run)),
            cancel: CancellationToken::new(),
            recorder: Arc::clone(&self.recorder),
        };
        active.insert(run_id, control.clone());
        drop(active);

        info!("Starting run {} of pipeline {}", run_id, pipeline.name);

        let drive = Drive {
            control: control.clone(),
            executor: Arc::clone(&self.executor),
            plan,
        };
        let active = Arc::clone(&self.active);
        let task = tokio::spawn(async move {
            let result = drive.run().await;
            active.lock().await.remove(&run_id);
            result
        });

        Ok(RunHandle { control, task })
    }

    /// Cancels a RUNNING run
    ///
    /// A run this coordinator is not driving is looked up in the recorder:
    /// a recorded run in any state yields `InvalidState`, an unknown id
    /// yields `NotFound`.
    pub async fn cancel(&self, run_id: Uuid) -> Result<PipelineRun> {
        let active = self.active.lock().await;
        if let Some(control) = active.get(&run_id).cloned() {
            drop(active);
            return control.cancel().await;
        }

        // Still holding the lock: a concurrent start cannot slip in between
        let recorded = self
            .recorder
            .load_pipeline_run(run_id)
            .await
            .map_err(CoordinatorError::Recorder)?;
        drop(active);

        match recorded {
            Some(run) if run.status == PipelineStatus::Running => {
                Err(CoordinatorError::InvalidState(format!(
                    "pipeline run {} is RUNNING but is not driven by this coordinator",
                    run_id
                )))
            }
            Some(run) => Err(CoordinatorError::InvalidState(format!(
                "pipeline run {} is {}, only RUNNING runs can be cancelled",
                run_id, run.status
            ))),
            None => Err(CoordinatorError::not_found("pipeline run", run_id)),
        }
    }

    /// Live state of an active run
    pub async fn snapshot(&self, run_id: Uuid) -> Option<PipelineRun> {
        let control = self.control(run_id).await.ok()?;
        Some(control.snapshot().await)
    }

    pub async fn is_active(&self, run_id: Uuid) -> bool {
        self.active.lock().await.contains_key(&run_id)
    }

    pub async fn active_run_ids(&self) -> Vec<Uuid> {
        self.active.lock().await.keys().copied().collect()
    }

    async fn control(&self, run_id: Uuid) -> Result<RunControl> {
        self.active
            .lock()
            .await
            .get(&run_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::not_found("active pipeline run", run_id))
    }
}

/// Shared access to a running pipeline run
#[derive(Clone)]
pub struct RunControl {
    id: Uuid,
    state: Arc<Mutex<PipelineRun>>,
    cancel: CancellationToken,
    recorder: Arc<dyn RunRecorder>,
}

impl RunControl {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn snapshot(&self) -> PipelineRun {
        self.state.lock().await.clone()
    }

    /// Cancels the run if it is still RUNNING
    ///
    /// The executing job run becomes FAILED with reason "cancelled", the run
    /// becomes CANCELLED and job runs that never started stay PENDING. Any
    /// other status is rejected with `InvalidState` and nothing changes.
    pub async fn cancel(&self) -> Result<PipelineRun> {
        let mut run = self.state.lock().await;
        if run.status != PipelineStatus::Running {
            return Err(CoordinatorError::InvalidState(format!(
                "pipeline run {} is {}, only RUNNING runs can be cancelled",
                run.id, run.status
            )));
        }

        let stopped_job = match run.running_job_run_mut() {
            Some(job_run) => {
                job_run.append_log(CANCELLED_REASON);
                job_run.finish(JobStatus::Failed)?;
                Some(job_run.clone())
            }
            None => None,
        };
        run.cancel()?;

        // Stop the drive loop and the in-flight execution
        self.cancel.cancel();

        if let Some(job_run) = &stopped_job {
            self.recorder
                .record_job_run(job_run)
                .await
                .map_err(CoordinatorError::Recorder)?;
        }
        self.recorder
            .record_pipeline_run(&run)
            .await
            .map_err(CoordinatorError::Recorder)?;

        info!("Run {} cancelled", run.id);

        Ok(run.clone())
    }
}

/// Handle to a started run and its drive task
pub struct RunHandle {
    control: RunControl,
    task: JoinHandle<Result<PipelineRun>>,
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.control.id)
            .finish_non_exhaustive()
    }
}

impl RunHandle {
    pub fn id(&self) -> Uuid {
        self.control.id
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub async fn snapshot(&self) -> PipelineRun {
        self.control.snapshot().await
    }

    pub async fn cancel(&self) -> Result<PipelineRun> {
        self.control.cancel().await
    }

    /// Waits for the drive task and returns the final run
    pub async fn wait(self) -> Result<PipelineRun> {
        self.task.await?
    }
}

struct PlannedJob {
    job_run_id: Uuid,
    job: Job,
}

/// Pairs each job run with its template, ascending `order_index`
fn plan_jobs(pipeline: &Pipeline, run: &PipelineRun) -> Result<Vec<PlannedJob>> {
    let mut plan = run
        .job_runs
        .iter()
        .map(|job_run| {
            pipeline
                .job(job_run.job_id)
                .map(|job| PlannedJob {
                    job_run_id: job_run.id,
                    job: job.clone(),
                })
                .ok_or_else(|| CoordinatorError::not_found("job", job_run.job_id))
        })
        .collect::<Result<Vec<_>>>()?;

    plan.sort_by_key(|planned| planned.job.order_index);
    Ok(plan)
}

/// How the race around one execution ended
enum Verdict {
    Completed(ExecutionOutcome),
    TimedOut(u32),
    Cancelled,
}

/// The sequential drive loop of one run
struct Drive {
    control: RunControl,
    executor: Arc<dyn JobExecutor>,
    plan: Vec<PlannedJob>,
}

impl Drive {
    async fn run(self) -> Result<PipelineRun> {
        for planned in &self.plan {
            let Some(started) = self.start_job(planned).await? else {
                return Ok(self.control.snapshot().await);
            };

            let verdict = self.execute(planned, started).await;

            if !self.settle_job(planned, verdict).await? {
                return Ok(self.control.snapshot().await);
            }
        }

        self.finish_run().await
    }

    /// Marks the job run RUNNING and returns when it started; `None` when
    /// the run already settled
    async fn start_job(&self, planned: &PlannedJob) -> Result<Option<Instant>> {
        let mut run = self.control.state.lock().await;
        if run.is_finished() {
            debug!(
                "Run {} is {}, not starting job {}",
                run.id, run.status, planned.job.name
            );
            return Ok(None);
        }

        let job_run = run
            .job_run_mut(planned.job_run_id)
            .ok_or_else(|| CoordinatorError::not_found("job run", planned.job_run_id))?;
        job_run.start()?;
        let started = Instant::now();
        let snapshot = job_run.clone();

        self.control
            .recorder
            .record_job_run(&snapshot)
            .await
            .map_err(CoordinatorError::Recorder)?;

        info!(
            "Run {}: job {} started (timeout {}s)",
            run.id, planned.job.name, planned.job.timeout_sec
        );

        Ok(Some(started))
    }

    /// Races the execution against its watchdog and run cancellation
    async fn execute(&self, planned: &PlannedJob, started: Instant) -> Verdict {
        let execution_token = self.control.cancel.child_token();
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<String>();

        let executor = Arc::clone(&self.executor);
        let request = ExecutionRequest::for_job(&planned.job, planned.job_run_id);
        let token = execution_token.clone();
        let mut execution =
            Box::pin(async move { executor.execute(request, log_tx, token).await });

        let watchdog =
            TimeoutWatchdog::arm(started, planned.job.timeout_sec, execution_token.clone());
        let expiry = watchdog.expired();
        tokio::pin!(expiry);

        let verdict = loop {
            tokio::select! {
                biased;
                _ = self.control.cancel.cancelled() => break Verdict::Cancelled,
                Some(chunk) = log_rx.recv() => {
                    self.append_chunk(planned.job_run_id, &chunk).await;
                }
                outcome = &mut execution => break Verdict::Completed(outcome),
                _ = &mut expiry => break Verdict::TimedOut(watchdog.timeout_sec()),
            }
        };

        if let Verdict::Completed(_) = verdict {
            // Output sent right before the outcome is still buffered
            while let Ok(chunk) = log_rx.try_recv() {
                self.append_chunk(planned.job_run_id, &chunk).await;
            }
        } else {
            // Stopping is best effort; let the executor clean up on its own
            execution_token.cancel();
            tokio::spawn(async move {
                let outcome = execution.await;
                debug!("Abandoned execution ended with {:?}", outcome);
            });
        }

        verdict
    }

    async fn append_chunk(&self, job_run_id: Uuid, chunk: &str) {
        let mut run = self.control.state.lock().await;
        if let Some(job_run) = run
            .job_run_mut(job_run_id)
            .filter(|job_run| job_run.is_running())
        {
            job_run.append_logs(chunk);
        }
    }

    /// Applies the verdict; false when the drive must stop
    async fn settle_job(&self, planned: &PlannedJob, verdict: Verdict) -> Result<bool> {
        let mut run = self.control.state.lock().await;
        if run.is_finished() {
            // cancel() settled the run first
            debug!(
                "Run {} already {}, discarding outcome of job {}",
                run.id, run.status, planned.job.name
            );
            return Ok(false);
        }

        let (failure, run_status) = match verdict {
            Verdict::Completed(ExecutionOutcome::Completed { exit_code: 0 }) => {
                (None, PipelineStatus::Running)
            }
            Verdict::Completed(ExecutionOutcome::Completed { exit_code }) => (
                Some(format!("failed with exit code {}", exit_code)),
                PipelineStatus::Failed,
            ),
            Verdict::Completed(ExecutionOutcome::ExecutionError { reason }) => (
                Some(CoordinatorError::Execution(reason).to_string()),
                PipelineStatus::Failed,
            ),
            Verdict::TimedOut(timeout_sec) => (
                Some(CoordinatorError::Timeout(timeout_sec).to_string()),
                PipelineStatus::Failed,
            ),
            Verdict::Cancelled => (
                Some(CANCELLED_REASON.to_string()),
                PipelineStatus::Cancelled,
            ),
        };

        let job_run = run
            .job_run_mut(planned.job_run_id)
            .ok_or_else(|| CoordinatorError::not_found("job run", planned.job_run_id))?;
        match &failure {
            None => job_run.finish(JobStatus::Success)?,
            Some(reason) => {
                job_run.append_log(reason);
                job_run.finish(JobStatus::Failed)?;
            }
        }
        let snapshot = job_run.clone();

        self.control
            .recorder
            .record_job_run(&snapshot)
            .await
            .map_err(CoordinatorError::Recorder)?;

        let Some(reason) = failure else {
            info!("Run {}: job {} succeeded", run.id, planned.job.name);
            return Ok(true);
        };

        warn!("Run {}: job {} {}", run.id, planned.job.name, reason);
        run.finish(run_status)?;
        self.control
            .recorder
            .record_pipeline_run(&run)
            .await
            .map_err(CoordinatorError::Recorder)?;

        info!("Run {} finished with status {}", run.id, run.status);

        Ok(false)
    }

    async fn finish_run(&self) -> Result<PipelineRun> {
        let mut run = self.control.state.lock().await;
        if !run.is_finished() {
            run.finish(PipelineStatus::Success)?;
            self.control
                .recorder
                .record_pipeline_run(&run)
                .await
                .map_err(CoordinatorError::Recorder)?;

            info!("Run {} finished with status {}", run.id, run.status);
        }

        Ok(run.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::LogChunkSender;
    use crate::recorder::InMemoryRecorder;
    use async_trait::async_trait;
    use conveyor_core::domain::run::JobRun;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Succeeds unless a job is listed in `outcomes`
    #[derive(Clone, Default)]
    struct ScriptedExecutor {
        outcomes: HashMap<String, ExecutionOutcome>,
        executed: Arc<StdMutex<Vec<String>>>,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    impl ScriptedExecutor {
        fn with_outcome(mut self, job: &str, outcome: ExecutionOutcome) -> Self {
            self.outcomes.insert(job.to_string(), outcome);
            self
        }

        fn executed(&self) -> Vec<String> {
            self.executed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            request: ExecutionRequest,
            log_chunks: LogChunkSender,
            _cancel: CancellationToken,
        ) -> ExecutionOutcome {
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);
            self.executed.lock().unwrap().push(request.job_name.clone());

            let _ = log_chunks.send(format!("$ {}", request.command));
            tokio::task::yield_now().await;
            let _ = log_chunks.send(format!("{} done\n", request.job_name));

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.outcomes
                .get(&request.job_name)
                .cloned()
                .unwrap_or(ExecutionOutcome::Completed { exit_code: 0 })
        }
    }

    /// Blocks on one job until its execution is cancelled
    #[derive(Clone, Default)]
    struct HangingExecutor {
        hang_on: String,
        started: Arc<Notify>,
        stopped: Arc<AtomicBool>,
        inner: ScriptedExecutor,
    }

    impl HangingExecutor {
        fn on(job: &str) -> Self {
            Self {
                hang_on: job.to_string(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl JobExecutor for HangingExecutor {
        async fn execute(
            &self,
            request: ExecutionRequest,
            log_chunks: LogChunkSender,
            cancel: CancellationToken,
        ) -> ExecutionOutcome {
            if request.job_name != self.hang_on {
                return self.inner.execute(request, log_chunks, cancel).await;
            }

            let _ = log_chunks.send("waiting for ever".to_string());
            self.started.notify_one();
            cancel.cancelled().await;
            self.stopped.store(true, Ordering::SeqCst);
            ExecutionOutcome::ExecutionError {
                reason: CANCELLED_REASON.to_string(),
            }
        }
    }

    /// Completes successfully once released, ignoring cancellation
    #[derive(Clone, Default)]
    struct GatedExecutor {
        started: Arc<Notify>,
        release: Arc<Notify>,
        completed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl JobExecutor for GatedExecutor {
        async fn execute(
            &self,
            _request: ExecutionRequest,
            _log_chunks: LogChunkSender,
            _cancel: CancellationToken,
        ) -> ExecutionOutcome {
            self.started.notify_one();
            self.release.notified().await;
            self.completed.store(true, Ordering::SeqCst);
            ExecutionOutcome::Completed { exit_code: 0 }
        }
    }

    /// Holds the first job run write with status `gate_on` until released
    #[derive(Clone)]
    struct GatedRecorder {
        runs: InMemoryRecorder,
        gate_on: JobStatus,
        gated: Arc<AtomicBool>,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl GatedRecorder {
        fn on(gate_on: JobStatus) -> Self {
            Self {
                runs: InMemoryRecorder::new(),
                gate_on,
                gated: Arc::new(AtomicBool::new(false)),
                reached: Arc::new(Notify::new()),
                release: Arc::new(Notify::new()),
            }
        }
    }

    #[async_trait]
    impl RunRecorder for GatedRecorder {
        async fn record_pipeline_run(&self, run: &PipelineRun) -> anyhow::Result<()> {
            self.runs.record_pipeline_run(run).await
        }

        async fn record_job_run(&self, job_run: &JobRun) -> anyhow::Result<()> {
            if job_run.status == self.gate_on && !self.gated.swap(true, Ordering::SeqCst) {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.runs.record_job_run(job_run).await
        }

        async fn load_pipeline_run(&self, id: Uuid) -> anyhow::Result<Option<PipelineRun>> {
            self.runs.load_pipeline_run(id).await
        }
    }

    /// Stores pipeline runs but fails every job run write
    #[derive(Default)]
    struct FailingRecorder {
        runs: InMemoryRecorder,
    }

    #[async_trait]
    impl RunRecorder for FailingRecorder {
        async fn record_pipeline_run(&self, run: &PipelineRun) -> anyhow::Result<()> {
            self.runs.record_pipeline_run(run).await
        }

        async fn record_job_run(&self, _job_run: &JobRun) -> anyhow::Result<()> {
            anyhow::bail!("database unreachable")
        }

        async fn load_pipeline_run(&self, id: Uuid) -> anyhow::Result<Option<PipelineRun>> {
            self.runs.load_pipeline_run(id).await
        }
    }

    fn pipeline(names: &[&str]) -> Pipeline {
        let mut pipeline = Pipeline::new("ci", None);
        // Added in reverse to prove order comes from order_index
        for (index, name) in names.iter().enumerate().rev() {
            pipeline.add_job(Job::new(
                pipeline.id,
                *name,
                "alpine",
                format!("echo {}", name),
                index as i32 * 10,
            ));
        }
        pipeline
    }

    fn statuses(run: &PipelineRun) -> Vec<JobStatus> {
        run.job_runs.iter().map(|job_run| job_run.status).collect()
    }

    async fn run_to_end(
        executor: Arc<dyn JobExecutor>,
        pipeline: &Pipeline,
    ) -> (PipelineRun, InMemoryRecorder) {
        let recorder = InMemoryRecorder::new();
        let coordinator = PipelineRunCoordinator::new(executor, Arc::new(recorder.clone()));
        let run = coordinator.create_run(pipeline).await.unwrap();
        let handle = coordinator.start(pipeline, run).await.unwrap();
        (handle.wait().await.unwrap(), recorder)
    }

    #[tokio::test]
    async fn test_all_jobs_succeed_in_order() {
        let executor = ScriptedExecutor::default();
        let pipeline = pipeline(&["build", "test", "deploy"]);

        let (run, recorder) = run_to_end(Arc::new(executor.clone()), &pipeline).await;

        assert_eq!(run.status, PipelineStatus::Success);
        assert_eq!(statuses(&run), vec![JobStatus::Success; 3]);
        assert_eq!(executor.executed(), vec!["build", "test", "deploy"]);
        assert_eq!(executor.max_running.load(Ordering::SeqCst), 1);

        // pipeline.started <= jr0.started <= jr0.ended <= jr1.started <= ... <= pipeline.ended
        let mut timeline = vec![run.started_at.unwrap()];
        for job_run in &run.job_runs {
            timeline.push(job_run.started_at.unwrap());
            timeline.push(job_run.ended_at.unwrap());
        }
        timeline.push(run.ended_at.unwrap());
        assert!(timeline.windows(2).all(|pair| pair[0] <= pair[1]));

        assert_eq!(run.job_runs[0].logs, "$ echo build\nbuild done\n");
        assert_eq!(recorder.pipeline_run(run.id).await, Some(run));
    }

    #[tokio::test]
    async fn test_failure_stops_the_sequence() {
        let executor = ScriptedExecutor::default()
            .with_outcome("test", ExecutionOutcome::Completed { exit_code: 2 });
        let pipeline = pipeline(&["build", "test", "deploy"]);

        let (run, recorder) = run_to_end(Arc::new(executor.clone()), &pipeline).await;

        assert_eq!(run.status, PipelineStatus::Failed);
        assert_eq!(
            statuses(&run),
            vec![JobStatus::Success, JobStatus::Failed, JobStatus::Pending]
        );
        assert!(run.job_runs[1].logs.ends_with("failed with exit code 2"));
        assert!(run.job_runs[1].ended_at.is_some());

        let never_started = &run.job_runs[2];
        assert!(never_started.started_at.is_none());
        assert!(never_started.ended_at.is_none());
        assert_eq!(executor.executed(), vec!["build", "test"]);

        let recorded = recorder.pipeline_run(run.id).await.unwrap();
        assert_eq!(recorded.status, PipelineStatus::Failed);
        assert!(recorded.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_execution_error_fails_job_with_reason() {
        let executor = ScriptedExecutor::default().with_outcome(
            "build",
            ExecutionOutcome::ExecutionError {
                reason: "image not found".to_string(),
            },
        );
        let pipeline = pipeline(&["build", "test"]);

        let (run, _) = run_to_end(Arc::new(executor), &pipeline).await;

        assert_eq!(run.status, PipelineStatus::Failed);
        assert_eq!(statuses(&run), vec![JobStatus::Failed, JobStatus::Pending]);
        assert!(
            run.job_runs[0]
                .logs
                .ends_with("execution error: image not found")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_job_and_stops_sequence() {
        let executor = HangingExecutor::on("test");
        let mut pipeline = pipeline(&["build", "test", "deploy"]);
        pipeline.jobs[1].timeout_sec = 5;

        let (run, _) = run_to_end(Arc::new(executor.clone()), &pipeline).await;

        assert_eq!(run.status, PipelineStatus::Failed);
        assert_eq!(
            statuses(&run),
            vec![JobStatus::Success, JobStatus::Failed, JobStatus::Pending]
        );
        let timed_out = &run.job_runs[1];
        assert!(timed_out.logs.ends_with("timeout after 5s"));
        assert_eq!(executor.inner.executed(), vec!["build"]);

        // The abandoned execution observes its cancellation
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(executor.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_while_job_running() {
        let executor = HangingExecutor::on("test");
        let recorder = InMemoryRecorder::new();
        let coordinator =
            PipelineRunCoordinator::new(Arc::new(executor.clone()), Arc::new(recorder.clone()));
        let pipeline = pipeline(&["build", "test", "deploy"]);

        let run = coordinator.create_run(&pipeline).await.unwrap();
        let handle = coordinator.start(&pipeline, run).await.unwrap();
        executor.started.notified().await;

        let cancelled = coordinator.cancel(handle.id()).await.unwrap();
        assert_eq!(cancelled.status, PipelineStatus::Cancelled);

        // A second cancel observes the final state and changes nothing
        let again = handle.cancel().await;
        assert!(matches!(again, Err(CoordinatorError::InvalidState(_))));

        let control = handle.control();
        let run = handle.wait().await.unwrap();
        assert_eq!(run, cancelled);
        assert_eq!(
            statuses(&run),
            vec![JobStatus::Success, JobStatus::Failed, JobStatus::Pending]
        );
        assert!(run.job_runs[1].logs.ends_with(CANCELLED_REASON));
        assert!(run.ended_at.is_some());
        assert_eq!(executor.inner.executed(), vec!["build"]);

        assert_eq!(recorder.pipeline_run(run.id).await, Some(run.clone()));
        assert!(!coordinator.is_active(run.id).await);
        assert!(matches!(
            control.cancel().await,
            Err(CoordinatorError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_rejected() {
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(InMemoryRecorder::new()),
        );
        let pipeline = pipeline(&["build"]);

        let run = coordinator.create_run(&pipeline).await.unwrap();
        let handle = coordinator.start(&pipeline, run).await.unwrap();
        let control = handle.control();
        let finished = handle.wait().await.unwrap();

        assert!(matches!(
            control.cancel().await,
            Err(CoordinatorError::InvalidState(_))
        ));
        assert_eq!(control.snapshot().await, finished);

        // No longer driven, answered from the recorded state
        assert!(matches!(
            coordinator.cancel(finished.id).await,
            Err(CoordinatorError::InvalidState(_))
        ));
        assert!(
            coordinator
                .cancel(Uuid::new_v4())
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_run_is_rejected() {
        let recorder = InMemoryRecorder::new();
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(recorder.clone()),
        );
        let pipeline = pipeline(&["build"]);
        let run = coordinator.create_run(&pipeline).await.unwrap();

        let result = coordinator.cancel(run.id).await;

        assert!(matches!(result, Err(CoordinatorError::InvalidState(_))));
        assert_eq!(recorder.pipeline_run(run.id).await, Some(run.clone()));

        // Rejection left the run startable
        let handle = coordinator.start(&pipeline, run).await.unwrap();
        assert_eq!(handle.wait().await.unwrap().status, PipelineStatus::Success);
    }

    #[tokio::test]
    async fn test_cancel_between_jobs_fails_no_job() {
        let executor = ScriptedExecutor::default();
        let recorder = GatedRecorder::on(JobStatus::Success);
        let coordinator =
            PipelineRunCoordinator::new(Arc::new(executor.clone()), Arc::new(recorder.clone()));
        let pipeline = pipeline(&["build", "test"]);

        let run = coordinator.create_run(&pipeline).await.unwrap();
        let handle = coordinator.start(&pipeline, run).await.unwrap();

        // build is settled and being recorded, test has not started
        recorder.reached.notified().await;
        let canceller = tokio::spawn({
            let coordinator = coordinator.clone();
            let run_id = handle.id();
            async move { coordinator.cancel(run_id).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        recorder.release.notify_one();

        let cancelled = canceller.await.unwrap().unwrap();
        let run = handle.wait().await.unwrap();

        assert_eq!(run, cancelled);
        assert_eq!(run.status, PipelineStatus::Cancelled);
        assert_eq!(statuses(&run), vec![JobStatus::Success, JobStatus::Pending]);
        assert!(!run.job_runs[0].logs.contains(CANCELLED_REASON));
        assert!(run.job_runs[1].started_at.is_none());
        assert_eq!(executor.executed(), vec!["build"]);
    }

    #[tokio::test]
    async fn test_outcome_after_cancel_is_discarded() {
        let executor = GatedExecutor::default();
        let recorder = InMemoryRecorder::new();
        let coordinator =
            PipelineRunCoordinator::new(Arc::new(executor.clone()), Arc::new(recorder.clone()));
        let pipeline = pipeline(&["build", "test"]);

        let run = coordinator.create_run(&pipeline).await.unwrap();
        let handle = coordinator.start(&pipeline, run).await.unwrap();
        executor.started.notified().await;

        // cancel() queues on the run first, then the execution completes
        let control = handle.control();
        let guard = control.state.lock().await;
        let canceller = tokio::spawn({
            let coordinator = coordinator.clone();
            let run_id = handle.id();
            async move { coordinator.cancel(run_id).await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        executor.release.notify_one();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(executor.completed.load(Ordering::SeqCst));
        drop(guard);

        let cancelled = canceller.await.unwrap().unwrap();
        let run = handle.wait().await.unwrap();

        assert_eq!(run, cancelled);
        assert_eq!(run.status, PipelineStatus::Cancelled);
        assert_eq!(statuses(&run), vec![JobStatus::Failed, JobStatus::Pending]);
        assert!(run.job_runs[0].logs.ends_with(CANCELLED_REASON));
        assert_eq!(recorder.pipeline_run(run.id).await, Some(run));
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_rejected() {
        let recorder = InMemoryRecorder::new();
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(recorder.clone()),
        );
        let pipeline = Pipeline::new("empty", None);

        let result = coordinator.create_run(&pipeline).await;

        assert!(matches!(result, Err(CoordinatorError::EmptyPipeline(id)) if id == pipeline.id));
        assert!(recorder.is_empty().await);
    }

    #[tokio::test]
    async fn test_start_requires_pending_run() {
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(InMemoryRecorder::new()),
        );
        let pipeline = pipeline(&["build"]);
        let mut run = coordinator.create_run(&pipeline).await.unwrap();
        run.start().unwrap();

        let result = coordinator.start(&pipeline, run.clone()).await;

        assert!(matches!(result, Err(CoordinatorError::InvalidState(_))));
        assert!(!coordinator.is_active(run.id).await);

        let unrecorded = PipelineRun::new(pipeline.id, &pipeline.jobs);
        let result = coordinator.start(&pipeline, unrecorded).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_run_is_started_at_most_once() {
        let executor = ScriptedExecutor::default();
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(executor.clone()),
            Arc::new(InMemoryRecorder::new()),
        );
        let pipeline = pipeline(&["build"]);
        let run = coordinator.create_run(&pipeline).await.unwrap();

        let handle = coordinator.start(&pipeline, run.clone()).await.unwrap();
        let second = coordinator.start(&pipeline, run.clone()).await;
        assert!(matches!(second, Err(CoordinatorError::InvalidState(_))));

        let finished = handle.wait().await.unwrap();
        assert_eq!(finished.status, PipelineStatus::Success);

        // A stale PENDING copy cannot restart a finished run either
        let third = coordinator.start(&pipeline, run).await;
        assert!(matches!(third, Err(CoordinatorError::InvalidState(_))));
        assert_eq!(executor.executed(), vec!["build"]);
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let executor = ScriptedExecutor::default()
            .with_outcome("lint", ExecutionOutcome::Completed { exit_code: 1 });
        let coordinator =
            PipelineRunCoordinator::new(Arc::new(executor), Arc::new(InMemoryRecorder::new()));
        let passing = pipeline(&["build", "test"]);
        let failing = pipeline(&["lint", "build"]);

        let first = coordinator.create_run(&passing).await.unwrap();
        let second = coordinator.create_run(&failing).await.unwrap();
        let first = coordinator.start(&passing, first).await.unwrap();
        let second = coordinator.start(&failing, second).await.unwrap();

        assert_eq!(first.wait().await.unwrap().status, PipelineStatus::Success);
        assert_eq!(second.wait().await.unwrap().status, PipelineStatus::Failed);
        assert!(coordinator.active_run_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_recorder_failure_aborts_run() {
        let coordinator = PipelineRunCoordinator::new(
            Arc::new(ScriptedExecutor::default()),
            Arc::new(FailingRecorder::default()),
        );
        let pipeline = pipeline(&["build"]);

        let run = coordinator.create_run(&pipeline).await.unwrap();
        let handle = coordinator.start(&pipeline, run).await.unwrap();

        assert!(matches!(
            handle.wait().await,
            Err(CoordinatorError::Recorder(_))
        ));
    }
}

//! Conveyor Runner
//!
//! Executes pipeline runs: job runs are driven one at a time, each inside a
//! container, bounded by its timeout and abortable by cancellation.
//!
//! Architecture:
//! - Executor: the [`JobExecutor`] contract and the podman implementation
//! - Watchdog: per-job deadline enforcement
//! - Recorder: persistence hook invoked on every state transition
//! - Coordinator: the sequential drive loop and run lifecycle

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod recorder;
pub mod watchdog;

pub use config::ExecutorConfig;
pub use coordinator::{PipelineRunCoordinator, RunControl, RunHandle};
pub use error::CoordinatorError;
pub use executor::podman::PodmanExecutor;
pub use executor::{ExecutionOutcome, ExecutionRequest, JobExecutor, LogChunkSender};
pub use recorder::{InMemoryRecorder, RunRecorder};
pub use watchdog::TimeoutWatchdog;

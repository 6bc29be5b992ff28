//! Per-job timeout enforcement
//!
//! A watchdog measures from the instant its job run became RUNNING, not
//! from when recording that transition finished. When it fires it cancels
//! the execution it guards; the coordinator then settles the job run as
//! timed out unless a natural outcome was already taken.

use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Deadline for a single job execution
#[derive(Debug)]
pub struct TimeoutWatchdog {
    timeout_sec: u32,
    deadline: Instant,
    execution: CancellationToken,
}

impl TimeoutWatchdog {
    /// Arms a watchdog expiring `timeout_sec` seconds after `started`
    pub fn arm(started: Instant, timeout_sec: u32, execution: CancellationToken) -> Self {
        Self {
            timeout_sec,
            deadline: started + Duration::from_secs(u64::from(timeout_sec)),
            execution,
        }
    }

    pub fn timeout_sec(&self) -> u32 {
        self.timeout_sec
    }

    /// Resolves at the deadline after requesting cancellation of the execution
    pub async fn expired(&self) {
        sleep_until(self.deadline).await;
        warn!("Execution exceeded its {}s timeout", self.timeout_sec);
        self.execution.cancel();
    }
}

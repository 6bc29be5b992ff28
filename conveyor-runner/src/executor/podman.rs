//! Podman job executor
//!
//! Runs each job in a throwaway container:
//! - Checking podman availability at startup
//! - Launching `podman run --rm` with the job's image, command and environment
//! - Streaming stdout/stderr line by line into the job log
//! - Killing and force-removing the container on cancellation

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::executor::{ExecutionOutcome, ExecutionRequest, JobExecutor, LogChunkSender};

/// Checks if podman is installed and available
pub async fn check_podman_available(config: &ExecutorConfig) -> Result<()> {
    let output = Command::new(&config.podman_bin)
        .arg("--version")
        .output()
        .await
        .with_context(|| {
            format!(
                "Failed to execute '{} --version'. Is podman installed?",
                config.podman_bin
            )
        })?;

    if !output.status.success() {
        anyhow::bail!("Podman is not working correctly");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    info!("Podman is available: {}", version.trim());

    Ok(())
}

/// Executes jobs with the podman CLI
#[derive(Debug, Clone)]
pub struct PodmanExecutor {
    config: ExecutorConfig,
}

impl PodmanExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Container name for a job run, unique per run so reruns never collide
    pub fn container_name(&self, request: &ExecutionRequest) -> String {
        format!("{}-{}", self.config.container_name_prefix, request.job_run_id)
    }

    /// Builds the `podman run` invocation for a job
    ///
    /// The image entrypoint is overridden with `/bin/sh` so the job command
    /// behaves the same regardless of how the image was built.
    fn run_command(&self, request: &ExecutionRequest) -> Command {
        let mut command = Command::new(&self.config.podman_bin);
        command
            .args(self.run_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn run_args(&self, request: &ExecutionRequest) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            self.container_name(request),
            "--entrypoint".to_string(),
            "/bin/sh".to_string(),
        ];

        for (key, value) in &request.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.extend(self.config.extra_run_args.iter().cloned());
        args.push(request.image.clone());
        args.push("-c".to_string());
        args.push(request.command.clone());
        args
    }

    /// Stops and removes a container, ignoring "no such container"
    async fn remove_container(&self, container_name: &str) {
        let output = Command::new(&self.config.podman_bin)
            .arg("rm")
            .arg("-f") // Force remove
            .arg(container_name)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                debug!("Container {} removed", container_name);
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!("Failed to remove container {}: {}", container_name, stderr.trim());
            }
            Err(e) => {
                warn!("Failed to remove container {}: {}", container_name, e);
            }
        }
    }
}

#[async_trait]
impl JobExecutor for PodmanExecutor {
    async fn execute(
        &self,
        request: ExecutionRequest,
        log_chunks: LogChunkSender,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        let container_name = self.container_name(&request);

        info!(
            "Starting container {} for job {} (image {})",
            container_name, request.job_name, request.image
        );

        let mut child = match self.run_command(&request).spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::ExecutionError {
                    reason: format!("failed to launch {}: {}", self.config.podman_bin, e),
                };
            }
        };

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(forward_lines(stdout, log_chunks.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(forward_lines(stderr, log_chunks.clone())));

        tokio::select! {
            status = child.wait() => {
                // Drain remaining output before reporting the outcome
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    if let Err(e) = task.await {
                        warn!("Log forwarder for {} failed: {}", container_name, e);
                    }
                }

                match status {
                    Ok(status) => {
                        let exit_code = status.code().unwrap_or(-1);
                        debug!("Container {} exited with code {}", container_name, exit_code);
                        ExecutionOutcome::Completed { exit_code }
                    }
                    Err(e) => ExecutionOutcome::ExecutionError {
                        reason: format!("failed to wait for container {}: {}", container_name, e),
                    },
                }
            }
            _ = cancel.cancelled() => {
                info!("Stopping container {} for job {}", container_name, request.job_name);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill podman client for {}: {}", container_name, e);
                }
                self.remove_container(&container_name).await;
                ExecutionOutcome::ExecutionError {
                    reason: "cancelled".to_string(),
                }
            }
        }
    }
}

/// Forwards each line of `reader` as one log chunk until EOF
async fn forward_lines<R>(reader: R, log_chunks: LogChunkSender)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if log_chunks.send(line).is_err() {
                    // Receiver gone, the job run is already settled
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read container output: {}", e);
                break;
            }
        }
    }
}

//! Executor configuration
//!
//! Settings for launching job containers, loaded from the environment with
//! defaults suitable for a local podman installation.

use anyhow::bail;

/// Container executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Path or name of the podman binary
    pub podman_bin: String,

    /// Prefix for container names; the job run id is appended
    pub container_name_prefix: String,

    /// Extra arguments passed to `podman run` before the image
    pub extra_run_args: Vec<String>,
}

impl ExecutorConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PODMAN_BIN (optional, default: podman)
    /// - CONTAINER_NAME_PREFIX (optional, default: conveyor)
    /// - EXTRA_RUN_ARGS (optional, whitespace separated)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let podman_bin = std::env::var("PODMAN_BIN").unwrap_or(defaults.podman_bin);

        let container_name_prefix =
            std::env::var("CONTAINER_NAME_PREFIX").unwrap_or(defaults.container_name_prefix);

        let extra_run_args = std::env::var("EXTRA_RUN_ARGS")
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.extra_run_args);

        Self {
            podman_bin,
            container_name_prefix,
            extra_run_args,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.podman_bin.trim().is_empty() {
            bail!("podman_bin cannot be empty");
        }

        if self.container_name_prefix.is_empty() {
            bail!("container_name_prefix cannot be empty");
        }

        if !self
            .container_name_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            bail!("container_name_prefix may only contain [a-zA-Z0-9_-]");
        }

        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            podman_bin: "podman".to_string(),
            container_name_prefix: "conveyor".to_string(),
            extra_run_args: Vec::new(),
        }
    }
}

//! Job template domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Timeout applied to a job when none is configured (one hour)
pub const DEFAULT_TIMEOUT_SEC: u32 = 3600;

/// One step of a pipeline, executed in a container
///
/// Owned by its pipeline; `pipeline_id` is a lookup handle, not an owning link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub image: String,
    pub command: String,
    pub env: BTreeMap<String, String>,
    /// Execution position within the pipeline, unique per pipeline
    pub order_index: i32,
    pub timeout_sec: u32,
}

impl Job {
    /// Creates a job template with an empty environment and [`DEFAULT_TIMEOUT_SEC`]
    pub fn new(
        pipeline_id: Uuid,
        name: impl Into<String>,
        image: impl Into<String>,
        command: impl Into<String>,
        order_index: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            name: name.into(),
            image: image.into(),
            command: command.into(),
            env: BTreeMap::new(),
            order_index,
            timeout_sec: DEFAULT_TIMEOUT_SEC,
        }
    }

    pub fn with_timeout(mut self, timeout_sec: u32) -> Self {
        self.timeout_sec = timeout_sec;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_env(key, value);
        self
    }

    /// Sets an environment variable, replacing any previous value for `key`
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn remove_env(&mut self, key: &str) -> Option<String> {
        self.env.remove(key)
    }

    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

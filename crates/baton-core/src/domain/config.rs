//! Submission-time parameters of a task.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::EngineError;

/// Free-form label that lets workers claim only a subset of the queue.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskGroup(String);

impl TaskGroup {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Retry budget, retention and routing for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Total number of executions ever allowed (first run included).
    pub attempt_count: u32,

    /// Retention of task and body. `None` keeps them forever.
    #[serde(default)]
    pub ttl: Option<Duration>,

    #[serde(default)]
    pub group: Option<TaskGroup>,
}

impl TaskConfig {
    pub fn new(attempt_count: u32, ttl: Option<Duration>) -> Result<Self, EngineError> {
        let config = Self {
            attempt_count,
            ttl,
            group: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_group(mut self, group: TaskGroup) -> Self {
        self.group = Some(group);
        self
    }

    /// Checked again by the engine before any write, since the fields are public.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.attempt_count == 0 {
            return Err(EngineError::InvalidConfig(
                "attempt_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

//! Engine and worker settings, with environment overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::TaskGroup;
use crate::ports::SortBy;

const ENV_CLAIM_ORDER: &str = "BATON_CLAIM_ORDER";
const ENV_POLL_INTERVAL_MS: &str = "BATON_POLL_INTERVAL_MS";
const ENV_SWEEP_INTERVAL_SECS: &str = "BATON_SWEEP_INTERVAL_SECS";
const ENV_WORKERS: &str = "BATON_WORKERS";
const ENV_DEFAULT_ATTEMPT_COUNT: &str = "BATON_DEFAULT_ATTEMPT_COUNT";
const ENV_WORKER_GROUPS: &str = "BATON_WORKER_GROUPS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_WORKERS: u64 = 4;
const DEFAULT_ATTEMPT_COUNT: u64 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got '{value}'")]
    NotAPositiveInteger { key: &'static str, value: String },

    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub claim_order: SortBy,

    /// How long an idle worker waits before polling again.
    pub poll_interval: Duration,

    pub sweep_interval: Duration,
    pub workers: usize,

    /// Used by callers that submit without an explicit budget.
    pub default_attempt_count: u32,

    /// Groups the workers claim from. Empty claims from everything.
    pub worker_groups: Vec<TaskGroup>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_order: SortBy::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            workers: DEFAULT_WORKERS as usize,
            default_attempt_count: DEFAULT_ATTEMPT_COUNT as u32,
            worker_groups: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Reads `BATON_*` variables from the process environment. Unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    pub fn from_env_with<F>(get_env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let claim_order = match get_env(ENV_CLAIM_ORDER) {
            Some(raw) => raw
                .trim()
                .parse::<SortBy>()
                .map_err(|reason| ConfigError::Invalid {
                    key: ENV_CLAIM_ORDER,
                    reason,
                })?,
            None => SortBy::default(),
        };

        let poll_interval_ms =
            parse_positive_u64_env(&get_env, ENV_POLL_INTERVAL_MS, DEFAULT_POLL_INTERVAL_MS)?;
        let sweep_interval_secs =
            parse_positive_u64_env(&get_env, ENV_SWEEP_INTERVAL_SECS, DEFAULT_SWEEP_INTERVAL_SECS)?;
        let workers = parse_positive_u64_env(&get_env, ENV_WORKERS, DEFAULT_WORKERS)?;
        let default_attempt_count =
            parse_positive_u64_env(&get_env, ENV_DEFAULT_ATTEMPT_COUNT, DEFAULT_ATTEMPT_COUNT)?;

        let worker_groups = get_env(ENV_WORKER_GROUPS)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(TaskGroup::new)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            claim_order,
            poll_interval: Duration::from_millis(poll_interval_ms),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            workers: usize::try_from(workers).map_err(|_| out_of_range(ENV_WORKERS, workers))?,
            default_attempt_count: u32::try_from(default_attempt_count)
                .map_err(|_| out_of_range(ENV_DEFAULT_ATTEMPT_COUNT, default_attempt_count))?,
            worker_groups,
        })
    }
}

fn parse_positive_u64_env<F>(
    get_env: &F,
    key: &'static str,
    default: u64,
) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get_env(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<u64>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::NotAPositiveInteger { key, value: raw }),
    }
}

fn out_of_range(key: &'static str, value: u64) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: format!("value {value} exceeds supported range"),
    }
}

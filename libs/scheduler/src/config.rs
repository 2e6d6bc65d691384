//! Scheduler configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Upper bound on worker threads. `None` derives it from the CPU count.
    pub max_threads: Option<usize>,

    /// CPUs left free when `max_threads` is derived from the CPU count.
    pub reserved_cpus: usize,

    /// Longest the dispatcher sleeps between passes when nothing wakes it.
    pub poll_interval_ms: u64,

    /// Passed through to every task via [`TaskContext`](crate::TaskContext).
    pub use_cache: bool,

    /// Working directory handed to tasks.
    pub workspace: Option<PathBuf>,

    /// Run each job name at most once per run.
    pub dedupe_by_name: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            reserved_cpus: 2,
            poll_interval_ms: 50,
            use_cache: true,
            workspace: None,
            dedupe_by_name: true,
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from `JOBLINE_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but unparsable values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_threads = parse_var(&lookup, "JOBLINE_MAX_THREADS")?.or(defaults.max_threads);
        let reserved_cpus =
            parse_var(&lookup, "JOBLINE_RESERVED_CPUS")?.unwrap_or(defaults.reserved_cpus);
        let poll_interval_ms =
            parse_var(&lookup, "JOBLINE_POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval_ms);
        let use_cache = parse_flag(&lookup, "JOBLINE_USE_CACHE")?.unwrap_or(defaults.use_cache);
        let workspace = lookup("JOBLINE_WORKSPACE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);
        let dedupe_by_name =
            parse_flag(&lookup, "JOBLINE_DEDUPE")?.unwrap_or(defaults.dedupe_by_name);

        let config = Self {
            max_threads,
            reserved_cpus,
            poll_interval_ms,
            use_cache,
            workspace,
            dedupe_by_name,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == Some(0) {
            return Err(SchedulerError::Config(
                "max_threads must be at least 1".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SchedulerError::Config(
                "poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker cap: `max_threads`, or the CPU count minus `reserved_cpus` (at least 1).
    pub fn max_workers(&self) -> usize {
        self.max_threads
            .unwrap_or_else(|| num_cpus::get().saturating_sub(self.reserved_cpus))
            .max(1)
    }

    /// Dispatcher poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| SchedulerError::Config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(None),
        Some(v) if v == "1" || v == "true" || v == "yes" => Ok(Some(true)),
        Some(v) if v == "0" || v == "false" || v == "no" => Ok(Some(false)),
        Some(v) => Err(SchedulerError::Config(format!(
            "{key}={v:?}: expected true or false"
        ))),
    }
}

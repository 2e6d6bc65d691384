//! Error types for the scheduler.

use jobline_id::{IdError, PipelineId, RunId};
use thiserror::Error;

/// Result alias used across the scheduler API.
pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

/// Failure reported by a task.
///
/// Any of these is fatal to the whole run.
#[derive(Debug, Error)]
pub enum JobError {
    /// The task reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The task panicked; the payload message is preserved.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The task stopped early because the run was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// IO error raised by the task.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error raised by the task.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Convenience constructor for [`JobError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Stable reason code for logs and summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            JobError::Failed(_) => "job_failed",
            JobError::Panicked(_) => "job_panicked",
            JobError::Cancelled => "job_cancelled",
            JobError::Io(_) => "io_error",
            JobError::Other(_) => "job_error",
        }
    }
}

/// A plan rejected before any of its jobs were queued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A group contains no jobs.
    #[error("group {index} has no jobs")]
    EmptyGroup { index: usize },

    /// The same job was listed twice in one group.
    #[error("job '{name}' appears more than once in group {index}")]
    DuplicateJob { index: usize, name: String },

    /// The pipeline's run has finished and accepts no more groups.
    #[error("pipeline '{pipeline}' is closed")]
    PipelineClosed { pipeline: PipelineId },
}

/// Errors returned by the [`Scheduler`](crate::Scheduler) API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The pipeline name failed validation.
    #[error("invalid pipeline id: {0}")]
    InvalidPipeline(#[from] IdError),

    /// The plan was malformed.
    #[error("plan rejected: {0}")]
    Plan(#[from] PlanError),

    /// The run already reached a terminal state.
    #[error("run {0} has already finished")]
    RunFinished(RunId),

    /// An OS thread could not be spawned.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SchedulerError {
    /// Stable reason code for logs and summaries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SchedulerError::InvalidPipeline(_) => "invalid_pipeline",
            SchedulerError::Plan(_) => "invalid_plan",
            SchedulerError::RunFinished(_) => "run_finished",
            SchedulerError::Spawn { .. } => "spawn_failed",
            SchedulerError::Config(_) => "config_invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_error_from_anyhow_is_transparent() {
        let err: JobError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.to_string(), "disk full");
        assert_eq!(err.reason_code(), "job_error");
    }

    #[test]
    fn test_plan_error_converts_into_scheduler_error() {
        let err: SchedulerError = PlanError::EmptyGroup { index: 2 }.into();
        assert_eq!(err.reason_code(), "invalid_plan");
        assert_eq!(err.to_string(), "plan rejected: group 2 has no jobs");
    }
}

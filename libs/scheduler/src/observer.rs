//! Job outcome callbacks.

use crate::error::JobError;
use crate::job::Job;

/// Receives job lifecycle callbacks from worker threads.
///
/// Callbacks run on the worker that executed the job, so they should be
/// quick. Every successfully completed job gets exactly one `on_executed`;
/// the failing job gets exactly one `on_failed`.
pub trait JobObserver: Send + Sync {
    /// A worker is about to execute the job.
    fn on_started(&self, _job: &Job) {}

    /// The job completed (or was skipped as already completed).
    fn on_executed(&self, _job: &Job) {}

    /// The job failed. The run is being cancelled.
    fn on_failed(&self, _job: &Job, _error: &JobError) {}

    /// The job was dropped without executing because the run was cancelled.
    fn on_discarded(&self, _job: &Job) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl JobObserver for NoopObserver {}

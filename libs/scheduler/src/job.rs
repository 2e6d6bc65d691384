//! Jobs, the tasks they wrap, and the context tasks run with.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use jobline_id::{JobId, PipelineId};
use serde::Serialize;

use crate::error::JobError;
use crate::signal::CancellationToken;

/// Executable body of a job.
///
/// Implemented for every `Fn(&TaskContext) -> Result<(), JobError>` closure.
pub trait Task: Send + Sync {
    /// Run the task once. Only success or failure matters to the scheduler.
    fn run(&self, ctx: &TaskContext) -> Result<(), JobError>;
}

impl<F> Task for F
where
    F: Fn(&TaskContext) -> Result<(), JobError> + Send + Sync,
{
    fn run(&self, ctx: &TaskContext) -> Result<(), JobError> {
        self(ctx)
    }
}

/// Per-execution context handed to a task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    job_id: JobId,
    job_name: String,
    pipeline: PipelineId,
    use_cache: bool,
    workspace: Option<PathBuf>,
    token: CancellationToken,
}

impl TaskContext {
    pub(crate) fn new(
        job: &Job,
        pipeline: PipelineId,
        use_cache: bool,
        workspace: Option<PathBuf>,
        token: CancellationToken,
    ) -> Self {
        Self {
            job_id: job.id(),
            job_name: job.name().to_string(),
            pipeline,
            use_cache,
            workspace,
            token,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Pipeline the job was dispatched from.
    pub fn pipeline(&self) -> &PipelineId {
        &self.pipeline
    }

    /// Whether the host asked for cached results to be reused.
    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    /// True once the run has been cancelled. Long tasks should check this
    /// between steps and return [`JobError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Execution state of a job.
///
/// `Pending → Running → {Succeeded, Skipped, Failed, Discarded}`, or
/// `Pending → Discarded` when flushed from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobState {
    Pending = 0,
    Running = 1,
    Succeeded = 2,
    /// A job with the same name already ran in this run.
    Skipped = 3,
    Failed = 4,
    /// Removed after the run was cancelled; never executed.
    Discarded = 5,
}

impl JobState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => JobState::Pending,
            1 => JobState::Running,
            2 => JobState::Succeeded,
            3 => JobState::Skipped,
            4 => JobState::Failed,
            _ => JobState::Discarded,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    /// Succeeded, or skipped because an identical job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::Skipped => "skipped",
            JobState::Failed => "failed",
            JobState::Discarded => "discarded",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of schedulable work.
///
/// Jobs are shared as `Arc<Job>`; only their state changes after creation.
pub struct Job {
    id: JobId,
    name: String,
    task: Box<dyn Task>,
    state: AtomicU8,
}

impl Job {
    /// Create a job from any [`Task`] implementation.
    pub fn new(name: impl Into<String>, task: impl Task + 'static) -> Arc<Self> {
        Arc::new(Self {
            id: JobId::new(),
            name: name.into(),
            task: Box::new(task),
            state: AtomicU8::new(JobState::Pending as u8),
        })
    }

    /// Create a job from a closure that needs no context.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        F: Fn() -> Result<(), JobError> + Send + Sync + 'static,
    {
        Self::new(name, move |_: &TaskContext| f())
    }

    /// Create a job from a closure that receives the [`TaskContext`].
    pub fn with_context<F>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        F: Fn(&TaskContext) -> Result<(), JobError> + Send + Sync + 'static,
    {
        Self::new(name, f)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Pending → Running`. False if the job already left `Pending`.
    pub(crate) fn start(&self) -> bool {
        self.transition(JobState::Pending, JobState::Running)
    }

    /// `Running → terminal`.
    pub(crate) fn finish(&self, to: JobState) -> bool {
        debug_assert!(to.is_terminal());
        self.transition(JobState::Running, to)
    }

    /// Any non-terminal state → `Discarded`.
    pub(crate) fn discard(&self) -> bool {
        self.transition(JobState::Pending, JobState::Discarded)
            || self.transition(JobState::Running, JobState::Discarded)
    }

    fn transition(&self, from: JobState, to: JobState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Run the task, turning a panic into [`JobError::Panicked`].
    pub(crate) fn execute(&self, ctx: &TaskContext) -> Result<(), JobError> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.task.run(ctx))) {
            Ok(result) => result,
            Err(payload) => Err(JobError::Panicked(panic_message(payload))),
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

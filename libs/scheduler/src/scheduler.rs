//! Public scheduler API.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use jobline_id::{PipelineId, RunId};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{Result, SchedulerError};
use crate::job::Job;
use crate::observer::{JobObserver, NoopObserver};
use crate::pipeline::{DiscardHook, Pipeline, PipelineSet};
use crate::plan::Plan;
use crate::signal::{CancelReason, CancellationToken};
use crate::worker::{RunContext, WorkerPool};

// =============================================================================
// Run state
// =============================================================================

/// Lifecycle of a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// `run` has not been called.
    Idle,
    Running,
    /// Every scheduled job succeeded (or was skipped as a duplicate).
    Completed,
    /// A job failed, or the scheduler hit an internal error.
    Failed,
    /// The host cancelled the run.
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunState::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters describing a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub state: RunState,
    pub succeeded: usize,
    pub skipped: usize,
    pub discarded: usize,
    /// Name of the job whose failure cancelled the run.
    pub failed_job: Option<String>,
}

#[derive(Default)]
struct RunStatus {
    state: Mutex<Option<RunState>>,
    changed: Condvar,
}

impl RunStatus {
    fn get(&self) -> RunState {
        self.state.lock().unwrap_or(RunState::Idle)
    }

    fn set(&self, state: RunState) {
        let mut slot = self.state.lock();
        if slot.is_some_and(|s| s.is_terminal()) {
            return;
        }
        *slot = Some(state);
        self.changed.notify_all();
    }

    fn wait_terminal(&self, deadline: Option<Instant>) -> bool {
        let mut slot = self.state.lock();
        loop {
            if slot.is_some_and(|s| s.is_terminal()) {
                return true;
            }
            match deadline {
                None => self.changed.wait(&mut slot),
                Some(deadline) => {
                    if self.changed.wait_until(&mut slot, deadline).timed_out() {
                        return slot.is_some_and(|s| s.is_terminal());
                    }
                }
            }
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Runs plans of jobs through named pipelines on a pool of worker threads.
///
/// A scheduler drives exactly one run. Plans may be scheduled before and
/// while it runs; once the run reaches a terminal state, scheduling fails
/// with [`SchedulerError::RunFinished`].
pub struct Scheduler {
    config: SchedulerConfig,
    ctx: Arc<RunContext>,
    pipelines: Arc<PipelineSet>,
    pool: Arc<WorkerPool>,
    status: Arc<RunStatus>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Create a scheduler that reports job outcomes to `observer`.
    pub fn with_observer(config: SchedulerConfig, observer: Arc<dyn JobObserver>) -> Result<Self> {
        config.validate()?;

        let ctx = Arc::new(RunContext::new(RunId::new(), &config, observer));
        let pool = Arc::new(WorkerPool::new(Arc::clone(&ctx)));
        let on_discard: DiscardHook = {
            let ctx = Arc::clone(&ctx);
            Arc::new(move |job: &Job| ctx.discard(job))
        };
        let pipelines = PipelineSet::new(Arc::clone(&ctx.wakeup), Some(on_discard));
        debug!(run_id = %ctx.run_id, max_workers = config.max_workers(), "Scheduler created");

        Ok(Self {
            config,
            ctx,
            pipelines: Arc::new(pipelines),
            pool,
            status: Arc::default(),
            dispatcher: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Add `plan` to the pipeline named `pipeline` (or `"default"`).
    ///
    /// Scheduling into an existing pipeline appends to it. The worker pool
    /// grows to cover the widest group scheduled so far, up to the
    /// configured cap.
    pub fn schedule(&self, plan: impl Into<Plan>, pipeline: Option<&str>) -> Result<Arc<Pipeline>> {
        let id = match pipeline {
            Some(name) => PipelineId::parse(name)?,
            None => PipelineId::default(),
        };
        let plan = plan.into();
        let groups = plan.len();
        let jobs = plan.job_count();

        let pipeline = self
            .pipelines
            .schedule(id, plan)
            .ok_or(SchedulerError::RunFinished(self.ctx.run_id))??;

        let target = self.pipelines.demand().min(self.config.max_workers());
        self.pool.grow_to(target)?;

        info!(
            run_id = %self.ctx.run_id,
            pipeline = %pipeline.id(),
            groups,
            jobs,
            workers = self.pool.len(),
            "Plan scheduled"
        );
        Ok(pipeline)
    }

    /// Start the dispatcher thread and return immediately.
    ///
    /// `use_cache` overrides the configured value for every task. Calling
    /// `run` again has no effect.
    pub fn run(&self, use_cache: Option<bool>) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            debug!(run_id = %self.ctx.run_id, "Run already started");
            return Ok(());
        }
        if let Some(use_cache) = use_cache {
            self.ctx.set_use_cache(use_cache);
        }

        self.status.set(RunState::Running);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.pipelines),
            Arc::clone(&self.pool),
            Arc::clone(&self.ctx),
            self.config.max_workers(),
            self.config.poll_interval(),
        );
        let status = Arc::clone(&self.status);
        let name = "jobline-dispatcher".to_string();

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let state = match panic::catch_unwind(AssertUnwindSafe(|| dispatcher.run())) {
                Ok(state) => state,
                Err(_) => {
                    error!("Dispatcher panicked");
                    RunState::Failed
                }
            };
            status.set(state);
        });

        match spawned {
            Ok(handle) => {
                *self.dispatcher.lock() = Some(handle);
                info!(run_id = %self.ctx.run_id, "Run started");
                Ok(())
            }
            Err(source) => {
                self.ctx.token.cancel(CancelReason::Internal(source.to_string()));
                self.pipelines.close();
                self.status.set(RunState::Failed);
                Err(SchedulerError::Spawn { name, source })
            }
        }
    }

    /// Request cancellation. Returns false if the run was already cancelled.
    ///
    /// Queued jobs are discarded; jobs already executing run to completion.
    pub fn cancel(&self) -> bool {
        if self.status.get().is_terminal() {
            return false;
        }
        let first = self.ctx.token.cancel(CancelReason::Requested);
        self.ctx.wakeup.notify();

        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            // No dispatcher will ever run.
            self.pipelines.close();
            self.status.set(RunState::Cancelled);
        }

        if first {
            info!(run_id = %self.ctx.run_id, "Run cancellation requested");
        }
        first
    }

    /// Block until the run reaches a terminal state.
    ///
    /// Returns immediately with an [`RunState::Idle`] summary if `run` was
    /// never called.
    pub fn wait(&self) -> RunSummary {
        if self.started.load(Ordering::Acquire) {
            self.status.wait_terminal(None);
            self.join_dispatcher();
        }
        self.summary()
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RunSummary> {
        if !self.started.load(Ordering::Acquire) {
            return Some(self.summary());
        }
        if !self.status.wait_terminal(Some(Instant::now() + timeout)) {
            return None;
        }
        self.join_dispatcher();
        Some(self.summary())
    }

    /// Current counters, without waiting.
    pub fn summary(&self) -> RunSummary {
        let failed_job = match self.ctx.token.reason() {
            Some(CancelReason::JobFailed { name, .. }) => Some(name),
            _ => None,
        };
        RunSummary {
            run_id: self.ctx.run_id,
            state: self.status.get(),
            succeeded: self.ctx.counters.succeeded.load(Ordering::Acquire),
            skipped: self.ctx.counters.skipped.load(Ordering::Acquire),
            discarded: self.ctx.counters.discarded.load(Ordering::Acquire),
            failed_job,
        }
    }

    pub fn state(&self) -> RunState {
        self.status.get()
    }

    /// Live worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.len()
    }

    pub fn pipeline(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(id)
    }

    /// Registered pipelines, in registration order.
    pub fn pipelines(&self) -> Vec<Arc<Pipeline>> {
        self.pipelines.snapshot()
    }

    /// The run's cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.ctx.token.clone()
    }

    pub fn run_id(&self) -> RunId {
        self.ctx.run_id
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn join_dispatcher(&self) {
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(run_id = %self.ctx.run_id, "Dispatcher thread panicked");
            }
        }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("run_id", &self.ctx.run_id)
            .field("state", &self.status.get())
            .field("workers", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.started.load(Ordering::Acquire) && !self.status.get().is_terminal() {
            warn!(run_id = %self.ctx.run_id, "Scheduler dropped while running, cancelling");
            self.ctx.token.cancel(CancelReason::Requested);
            self.ctx.wakeup.notify();
        }
        self.join_dispatcher();

        // Workers spawned by `schedule` for a run that never started.
        self.pool.shutdown();
        self.pool.join();
    }
}

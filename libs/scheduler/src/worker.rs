//! Worker threads and the shared run context they execute jobs with.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use jobline_id::{PipelineId, RunId};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::{JobError, SchedulerError};
use crate::gate::GroupGate;
use crate::job::{Job, JobState, TaskContext};
use crate::observer::JobObserver;
use crate::registry::{Claim, JobRegistry};
use crate::signal::{CancelReason, CancellationToken, Wakeup};

/// Entry in the pending queue.
pub(crate) enum Dispatch {
    Run(Assignment),
    /// Sentinel: the receiving worker exits.
    Shutdown,
}

/// A job handed to a worker together with its group's gate.
pub(crate) struct Assignment {
    pub(crate) job: Arc<Job>,
    pub(crate) gate: Arc<GroupGate>,
    pub(crate) pipeline: PipelineId,
}

enum Outcome {
    Ran,
    Skipped,
    Discarded,
    Failed(JobError),
}

#[derive(Debug, Default)]
pub(crate) struct RunCounters {
    pub(crate) succeeded: AtomicUsize,
    pub(crate) skipped: AtomicUsize,
    pub(crate) discarded: AtomicUsize,
}

/// State shared by the dispatcher and every worker of one run.
pub(crate) struct RunContext {
    pub(crate) run_id: RunId,
    pub(crate) token: CancellationToken,
    pub(crate) wakeup: Arc<Wakeup>,
    pub(crate) counters: RunCounters,
    observer: Arc<dyn JobObserver>,
    registry: JobRegistry,
    use_cache: AtomicBool,
    workspace: Option<PathBuf>,
    dedupe_by_name: bool,
    poll_interval: Duration,
}

impl RunContext {
    pub(crate) fn new(
        run_id: RunId,
        config: &SchedulerConfig,
        observer: Arc<dyn JobObserver>,
    ) -> Self {
        Self {
            run_id,
            token: CancellationToken::new(),
            wakeup: Arc::default(),
            counters: RunCounters::default(),
            observer,
            registry: JobRegistry::default(),
            use_cache: AtomicBool::new(config.use_cache),
            workspace: config.workspace.clone(),
            dedupe_by_name: config.dedupe_by_name,
            poll_interval: config.poll_interval(),
        }
    }

    pub(crate) fn set_use_cache(&self, use_cache: bool) {
        self.use_cache.store(use_cache, Ordering::Release);
    }

    /// Drop a job that will never execute.
    pub(crate) fn discard(&self, job: &Job) {
        if job.discard() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(run_id = %self.run_id, job = %job.name(), "Job discarded");
            self.observer.on_discarded(job);
            self.registry.notify_finished();
        }
    }

    fn execute(&self, worker: usize, assignment: &Assignment) -> Outcome {
        let job = &assignment.job;

        if self.dedupe_by_name {
            if let Claim::Taken(owner) = self.registry.claim(job) {
                return self.reuse_outcome(worker, assignment, &owner);
            }
        }
        if !job.start() {
            // The same job object was dispatched twice.
            return self.reuse_outcome(worker, assignment, job);
        }

        self.observer.on_started(job);
        let ctx = TaskContext::new(
            job,
            assignment.pipeline.clone(),
            self.use_cache.load(Ordering::Acquire),
            self.workspace.clone(),
            self.token.clone(),
        );

        debug!(pipeline = %assignment.pipeline, job = %job.name(), worker, "Job started");
        let started = Instant::now();
        let result = job.execute(&ctx);
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    pipeline = %assignment.pipeline,
                    job = %job.name(),
                    worker,
                    duration_ms,
                    "Job finished"
                );
                Outcome::Ran
            }
            Err(error) => {
                error!(
                    pipeline = %assignment.pipeline,
                    job = %job.name(),
                    worker,
                    duration_ms,
                    reason = error.reason_code(),
                    error = %error,
                    "Job failed"
                );
                Outcome::Failed(error)
            }
        }
    }

    /// Wait for the job that owns this name and adopt its result.
    fn reuse_outcome(&self, worker: usize, assignment: &Assignment, owner: &Job) -> Outcome {
        assignment.job.start();
        if !owner.state().is_terminal() {
            info!(
                pipeline = %assignment.pipeline,
                job = %owner.name(),
                worker,
                "Job is being processed elsewhere, waiting for completion"
            );
        }

        match self
            .registry
            .wait_for(owner, &self.token, self.poll_interval)
        {
            Some(state) if state.is_success() => {
                info!(pipeline = %assignment.pipeline, job = %owner.name(), "Job already processed, skipping");
                Outcome::Skipped
            }
            _ => Outcome::Discarded,
        }
    }

    /// Record the outcome. Returns false when the worker must stop.
    fn complete(&self, assignment: &Assignment, outcome: Outcome) -> bool {
        let job = &assignment.job;
        match outcome {
            Outcome::Ran => {
                job.finish(JobState::Succeeded);
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.release(assignment);
                true
            }
            Outcome::Skipped => {
                job.finish(JobState::Skipped);
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                self.release(assignment);
                true
            }
            Outcome::Discarded => {
                self.discard(job);
                // The slot was acquired at dispatch; the group still has to drain.
                self.release_slot(assignment);
                true
            }
            Outcome::Failed(error) => {
                job.finish(JobState::Failed);
                self.token.cancel(CancelReason::JobFailed {
                    job: job.id(),
                    name: job.name().to_string(),
                    error: error.to_string(),
                });
                self.observer.on_failed(job, &error);
                self.registry.notify_finished();
                self.wakeup.notify();
                false
            }
        }
    }

    /// Report completion, then free the job's slot in its group gate.
    ///
    /// The callback fires before the release so that it happens-before any
    /// job of the pipeline's next group starts.
    fn release(&self, assignment: &Assignment) {
        self.observer.on_executed(&assignment.job);
        self.release_slot(assignment);
    }

    fn release_slot(&self, assignment: &Assignment) {
        self.registry.notify_finished();
        let remaining = assignment.gate.release();
        if remaining == 0 {
            debug!(pipeline = %assignment.pipeline, "Group drained");
        }
        self.wakeup.notify();
    }
}

struct CurrentJob {
    name: String,
    since: Instant,
}

struct Worker {
    index: usize,
    current: Arc<Mutex<Option<CurrentJob>>>,
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Pool of worker threads draining the shared pending queue.
///
/// The pool only grows; workers exit on a shutdown sentinel or after
/// their job fails.
pub(crate) struct WorkerPool {
    tx: Sender<Dispatch>,
    rx: Receiver<Dispatch>,
    workers: Mutex<Vec<Worker>>,
    spawned: AtomicUsize,
    ctx: Arc<RunContext>,
}

impl WorkerPool {
    pub(crate) fn new(ctx: Arc<RunContext>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            workers: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
            ctx,
        }
    }

    /// Spawn workers until `target` have been spawned. Returns how many were
    /// added.
    pub(crate) fn grow_to(&self, target: usize) -> Result<usize, SchedulerError> {
        let mut workers = self.workers.lock();
        let mut added = 0;

        while workers.len() < target {
            let index = self.spawned.fetch_add(1, Ordering::Relaxed);
            let name = format!("jobline-worker-{index}");
            let rx = self.rx.clone();
            let ctx = Arc::clone(&self.ctx);
            let current = Arc::new(Mutex::new(None));
            let worker_current = Arc::clone(&current);
            let alive = Arc::new(AtomicBool::new(true));
            let worker_alive = Arc::clone(&alive);

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    run_worker(index, rx, ctx, worker_current);
                    worker_alive.store(false, Ordering::Release);
                })
                .map_err(|source| SchedulerError::Spawn { name, source })?;

            workers.push(Worker {
                index,
                current,
                alive,
                handle,
            });
            added += 1;
        }

        if added > 0 {
            info!(run_id = %self.ctx.run_id, added, workers = workers.len(), "Worker pool grown");
        }
        Ok(added)
    }

    /// Workers still running. A worker whose job failed has exited and is
    /// not counted; the pool does not replace it.
    pub(crate) fn len(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|worker| worker.alive.load(Ordering::Acquire))
            .count()
    }

    pub(crate) fn submit(&self, assignment: Assignment) {
        // The pool holds a receiver, so the channel never disconnects.
        let _ = self.tx.send(Dispatch::Run(assignment));
    }

    /// Entries waiting in the pending queue.
    pub(crate) fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Empty the pending queue, discarding every job in it.
    pub(crate) fn flush(&self) -> usize {
        let mut flushed = 0;
        while let Ok(dispatch) = self.rx.try_recv() {
            if let Dispatch::Run(assignment) = dispatch {
                self.ctx.discard(&assignment.job);
                flushed += 1;
            }
        }
        flushed
    }

    /// Queue one sentinel per live worker.
    pub(crate) fn shutdown(&self) {
        let count = self.len();
        for _ in 0..count {
            let _ = self.tx.send(Dispatch::Shutdown);
        }
    }

    /// Join every worker. Jobs still executing are waited for; they cannot
    /// be interrupted.
    pub(crate) fn join(&self) {
        let workers = std::mem::take(&mut *self.workers.lock());

        for worker in &workers {
            if let Some(current) = worker.current.lock().as_ref() {
                warn!(
                    run_id = %self.ctx.run_id,
                    worker = worker.index,
                    job = %current.name,
                    running_ms = current.since.elapsed().as_millis() as u64,
                    "Worker still executing a job, waiting for it to return"
                );
            }
        }

        for worker in workers {
            if worker.handle.join().is_err() {
                error!(run_id = %self.ctx.run_id, worker = worker.index, "Worker thread panicked");
            }
        }
    }
}

fn run_worker(
    index: usize,
    rx: Receiver<Dispatch>,
    ctx: Arc<RunContext>,
    current: Arc<Mutex<Option<CurrentJob>>>,
) {
    debug!(run_id = %ctx.run_id, worker = index, "Worker started");
    let mut executed: u64 = 0;

    while let Ok(dispatch) = rx.recv() {
        let Dispatch::Run(assignment) = dispatch else {
            break;
        };

        if ctx.token.is_cancelled() {
            ctx.discard(&assignment.job);
            continue;
        }

        *current.lock() = Some(CurrentJob {
            name: assignment.job.name().to_string(),
            since: Instant::now(),
        });
        let outcome = ctx.execute(index, &assignment);
        *current.lock() = None;
        executed += 1;

        if !ctx.complete(&assignment, outcome) {
            break;
        }
    }

    debug!(run_id = %ctx.run_id, worker = index, executed, "Worker stopped");
}

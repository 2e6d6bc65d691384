//! The scheduler loop.
//!
//! One dispatcher thread per run moves groups from pipelines into the
//! pending queue, one group per pipeline at a time, and decides when the
//! run is over.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::pipeline::PipelineSet;
use crate::scheduler::RunState;
use crate::signal::CancelReason;
use crate::worker::{Assignment, RunContext, WorkerPool};

pub(crate) struct Dispatcher {
    pipelines: Arc<PipelineSet>,
    pool: Arc<WorkerPool>,
    ctx: Arc<RunContext>,
    max_workers: usize,
    poll_interval: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        pipelines: Arc<PipelineSet>,
        pool: Arc<WorkerPool>,
        ctx: Arc<RunContext>,
        max_workers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pipelines,
            pool,
            ctx,
            max_workers,
            poll_interval,
        }
    }

    /// Drive the run to a terminal state.
    pub(crate) fn run(&self) -> RunState {
        info!(
            run_id = %self.ctx.run_id,
            pipelines = self.pipelines.snapshot().len(),
            max_workers = self.max_workers,
            "Dispatcher started"
        );

        let mut passes: u64 = 0;
        loop {
            if self.ctx.token.is_cancelled() {
                break;
            }

            if let Err(err) = self.grow_pool() {
                warn!(run_id = %self.ctx.run_id, error = %err, "Could not grow worker pool");
                self.ctx.token.cancel(CancelReason::Internal(err.to_string()));
                break;
            }

            let dispatched = self.dispatch_ready();
            self.clear_reset_gates();
            passes += 1;

            if dispatched > 0 {
                debug!(
                    run_id = %self.ctx.run_id,
                    dispatched,
                    queued = self.pool.queued(),
                    "Jobs dispatched"
                );
            } else if self.pipelines.close_if_drained() {
                break;
            }

            self.ctx.wakeup.wait_timeout(self.poll_interval);
        }

        let state = self.finish();
        info!(run_id = %self.ctx.run_id, state = %state, passes, "Dispatcher stopped");
        state
    }

    fn grow_pool(&self) -> crate::Result<usize> {
        let target = self.pipelines.demand().min(self.max_workers);
        self.pool.grow_to(target)
    }

    /// Hand out the next group of every idle pipeline, in registration order.
    fn dispatch_ready(&self) -> usize {
        let mut dispatched = 0;

        for pipeline in self.pipelines.snapshot() {
            if self.ctx.token.is_cancelled() {
                break;
            }
            let Some((group, gate)) = pipeline.take_next_group() else {
                continue;
            };

            debug!(
                pipeline = %pipeline.id(),
                jobs = group.len(),
                remaining_groups = pipeline.len(),
                "Dispatching group"
            );

            for job in group.into_jobs() {
                // Acquired before the push so the gate never resets early.
                if !gate.acquire() {
                    break;
                }
                self.pool.submit(Assignment {
                    job,
                    gate: Arc::clone(&gate),
                    pipeline: pipeline.id().clone(),
                });
                dispatched += 1;
            }
        }

        dispatched
    }

    fn clear_reset_gates(&self) {
        for pipeline in self.pipelines.snapshot() {
            if pipeline.clear_gate_if_reset() {
                debug!(pipeline = %pipeline.id(), "Group completed");
            }
        }
    }

    /// Stop the workers and compute the final state.
    fn finish(&self) -> RunState {
        let reason = self.ctx.token.reason();

        if let Some(reason) = &reason {
            self.pipelines.close();
            let flushed = self.pool.flush();
            warn!(
                run_id = %self.ctx.run_id,
                reason = %reason,
                flushed,
                "Run cancelled, pending jobs discarded"
            );
        }

        self.pool.shutdown();
        self.pool.join();

        match reason {
            None => RunState::Completed,
            Some(CancelReason::Requested) => RunState::Cancelled,
            Some(_) => RunState::Failed,
        }
    }
}

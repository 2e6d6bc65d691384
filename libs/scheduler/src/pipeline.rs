//! Threadsafe pipelines and the registry the dispatcher iterates over.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use jobline_id::PipelineId;
use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::PlanError;
use crate::gate::GroupGate;
use crate::job::Job;
use crate::plan::{JobGroup, Plan};
use crate::signal::Wakeup;

/// Called for every job a pipeline drops without running it.
pub(crate) type DiscardHook = Arc<dyn Fn(&Job) + Send + Sync>;

/// A named, ordered stream of job groups.
///
/// Groups leave the pipeline in FIFO order, one at a time: while the
/// current group's gate is set and not reset, no further group is handed out.
pub struct Pipeline {
    id: PipelineId,
    state: Mutex<PipelineState>,
    wakeup: Arc<Wakeup>,
    on_discard: Option<DiscardHook>,
}

#[derive(Default)]
struct PipelineState {
    groups: VecDeque<JobGroup>,
    paused: bool,
    closed: bool,
    gate: Option<Arc<GroupGate>>,
    concurrent_jobs: usize,
}

impl PipelineState {
    fn outstanding(&self) -> usize {
        self.groups.len() + usize::from(self.gate.is_some())
    }
}

impl Pipeline {
    /// Create a standalone pipeline.
    pub fn new(id: PipelineId) -> Self {
        Self::with_hooks(id, Arc::default(), None)
    }

    pub(crate) fn with_hooks(
        id: PipelineId,
        wakeup: Arc<Wakeup>,
        on_discard: Option<DiscardHook>,
    ) -> Self {
        Self {
            id,
            state: Mutex::new(PipelineState::default()),
            wakeup,
            on_discard,
        }
    }

    pub fn id(&self) -> &PipelineId {
        &self.id
    }

    /// Append the plan's groups. Returns how many groups were queued.
    ///
    /// The plan is validated first; a malformed plan queues nothing.
    pub fn add(&self, plan: impl Into<Plan>) -> Result<usize, PlanError> {
        let plan = plan.into();
        plan.validate()?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(PlanError::PipelineClosed {
                pipeline: self.id.clone(),
            });
        }

        let added = plan.len();
        state.concurrent_jobs = state.concurrent_jobs.max(plan.max_width());
        state.groups.extend(plan.into_groups());
        let queued = state.groups.len();
        drop(state);

        debug!(pipeline = %self.id, added, queued, "Groups added to pipeline");
        self.wakeup.notify();
        Ok(added)
    }

    /// Pop the next group without blocking. `None` when empty or paused.
    pub fn get(&self) -> Option<JobGroup> {
        let mut state = self.state.lock();
        if state.paused {
            return None;
        }
        state.groups.pop_front()
    }

    /// Groups still queued.
    pub fn len(&self) -> usize {
        self.state.lock().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().groups.is_empty()
    }

    /// Widest group ever added: the pipeline's concurrency demand.
    pub fn concurrent_jobs(&self) -> usize {
        self.state.lock().concurrent_jobs
    }

    /// Stop handing out groups. The group already in flight keeps running.
    pub fn pause(&self) {
        self.state.lock().paused = true;
        debug!(pipeline = %self.id, "Pipeline paused");
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        debug!(pipeline = %self.id, "Pipeline resumed");
        self.wakeup.notify();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Drop every queued group. Returns how many were dropped.
    ///
    /// Jobs of the dropped groups are marked discarded and, inside a
    /// scheduler, counted in the run summary.
    pub fn cancel(&self) -> usize {
        let dropped: Vec<JobGroup> = self.state.lock().groups.drain(..).collect();
        for job in dropped.iter().flat_map(JobGroup::jobs) {
            match &self.on_discard {
                Some(hook) => hook(job),
                None => {
                    job.discard();
                }
            }
        }
        debug!(pipeline = %self.id, dropped = dropped.len(), "Pipeline cancelled");
        self.wakeup.notify();
        dropped.len()
    }

    /// Snapshot of queued job names, one entry per group.
    pub fn list(&self) -> Vec<Vec<String>> {
        self.state.lock().groups.iter().map(JobGroup::names).collect()
    }

    /// Gate of the group currently in flight, if any.
    pub fn gate(&self) -> Option<Arc<GroupGate>> {
        self.state.lock().gate.clone()
    }

    pub fn set_gate(&self, gate: Arc<GroupGate>) {
        self.state.lock().gate = Some(gate);
    }

    pub fn clear_gate(&self) -> Option<Arc<GroupGate>> {
        self.state.lock().gate.take()
    }

    /// True while a group is in flight and its gate has not reset.
    pub fn has_active_gate(&self) -> bool {
        self.state
            .lock()
            .gate
            .as_ref()
            .is_some_and(|gate| !gate.is_reset())
    }

    /// Pop the next group and install a fresh gate for it, atomically.
    ///
    /// Returns `None` when paused, empty, or a gate is still set.
    pub(crate) fn take_next_group(&self) -> Option<(JobGroup, Arc<GroupGate>)> {
        let mut state = self.state.lock();
        if state.paused || state.gate.is_some() {
            return None;
        }
        let group = state.groups.pop_front()?;
        let gate = Arc::new(GroupGate::new(group.len()));
        state.gate = Some(Arc::clone(&gate));
        Some((group, gate))
    }

    /// Clear the gate if its group has fully completed.
    pub(crate) fn clear_gate_if_reset(&self) -> bool {
        let mut state = self.state.lock();
        if state.gate.as_ref().is_some_and(|gate| gate.is_reset()) {
            state.gate = None;
            true
        } else {
            false
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("queued", &state.groups.len())
            .field("paused", &state.paused)
            .field("closed", &state.closed)
            .field("in_flight", &state.gate.is_some())
            .finish()
    }
}

/// Registered pipelines, in registration order.
///
/// Closing the set is the dispatcher's termination decision; it happens
/// under the same lock `schedule` uses, so a plan is either seen by the
/// dispatcher or rejected.
#[derive(Default)]
pub(crate) struct PipelineSet {
    inner: Mutex<PipelineSetInner>,
    wakeup: Arc<Wakeup>,
    on_discard: Option<DiscardHook>,
}

#[derive(Default)]
struct PipelineSetInner {
    pipelines: IndexMap<PipelineId, Arc<Pipeline>>,
    closed: bool,
}

impl PipelineSet {
    /// Pipelines registered here share `wakeup` and report dropped jobs to
    /// `on_discard`.
    pub(crate) fn new(wakeup: Arc<Wakeup>, on_discard: Option<DiscardHook>) -> Self {
        Self {
            inner: Mutex::default(),
            wakeup,
            on_discard,
        }
    }

    /// Look up `id`, registering a new pipeline if needed, and add `plan` to
    /// it. Registering an existing id merges into that pipeline.
    ///
    /// Returns `None` once the set is closed.
    pub(crate) fn schedule(
        &self,
        id: PipelineId,
        plan: Plan,
    ) -> Option<Result<Arc<Pipeline>, PlanError>> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }

        let pipeline = inner
            .pipelines
            .entry(id)
            .or_insert_with_key(|id| {
                debug!(pipeline = %id, "Registering pipeline");
                Arc::new(Pipeline::with_hooks(
                    id.clone(),
                    Arc::clone(&self.wakeup),
                    self.on_discard.clone(),
                ))
            })
            .clone();

        Some(pipeline.add(plan).map(|_| pipeline))
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.inner.lock().pipelines.get(id).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Pipeline>> {
        self.inner.lock().pipelines.values().cloned().collect()
    }

    /// Largest concurrency demand over all pipelines.
    pub(crate) fn demand(&self) -> usize {
        self.snapshot()
            .iter()
            .map(|p| p.concurrent_jobs())
            .max()
            .unwrap_or(0)
    }

    /// Close the set and every pipeline if nothing is queued or in flight.
    pub(crate) fn close_if_drained(&self) -> bool {
        let mut inner = self.inner.lock();
        let mut states: Vec<_> = inner.pipelines.values().map(|p| p.lock_state()).collect();

        if states.iter().any(|s| s.outstanding() > 0) {
            return false;
        }

        for state in &mut states {
            state.closed = true;
        }
        drop(states);
        inner.closed = true;
        true
    }

    /// Close unconditionally, e.g. after cancellation.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.lock();
        for pipeline in inner.pipelines.values() {
            pipeline.lock_state().closed = true;
        }
        inner.closed = true;
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

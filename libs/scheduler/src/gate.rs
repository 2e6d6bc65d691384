//! Per-group completion gate.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Counting gate sized to a dispatched group.
///
/// The dispatcher acquires one slot per job it queues; workers release one
/// slot per job that completes. The gate is *reset* once every slot of the
/// group has been released, which is what lets the pipeline's next group go.
#[derive(Debug)]
pub struct GroupGate {
    size: usize,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl GroupGate {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    /// Group size the gate was created for.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Take one slot. Returns false once all `size` slots are taken.
    pub fn acquire(&self) -> bool {
        self.acquired
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.size).then_some(n + 1)
            })
            .is_ok()
    }

    /// Return one slot. Returns the number of slots still outstanding.
    pub fn release(&self) -> usize {
        let acquired = self.acquired.load(Ordering::Acquire);
        let released = self
            .released
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < acquired).then_some(n + 1)
            })
            .map(|prev| prev + 1)
            .unwrap_or(acquired);
        acquired - released
    }

    /// Slots acquired but not yet released: jobs queued or in flight.
    pub fn outstanding(&self) -> usize {
        let released = self.released.load(Ordering::Acquire);
        self.acquired.load(Ordering::Acquire).saturating_sub(released)
    }

    /// True once every slot of the group has been acquired and released.
    pub fn is_reset(&self) -> bool {
        self.released.load(Ordering::Acquire) >= self.size
    }
}

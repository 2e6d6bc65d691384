//! Cross-thread signals: the run's cancellation token and the dispatcher wakeup.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobline_id::JobId;
use parking_lot::{Condvar, Mutex};

/// Why a run was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// A job failed; the whole run stops.
    JobFailed {
        job: JobId,
        name: String,
        error: String,
    },

    /// Cancellation was requested by the host.
    Requested,

    /// The scheduler could not keep running (e.g. a worker could not be spawned).
    Internal(String),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::JobFailed { name, error, .. } => {
                write!(f, "job '{name}' failed: {error}")
            }
            CancelReason::Requested => f.write_str("cancellation requested"),
            CancelReason::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

/// One-shot cancellation flag shared by the dispatcher, workers and tasks.
///
/// Once set it stays set for the lifetime of the run; the first reason wins.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    changed: Condvar,
}

impl CancellationToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the token. Returns false if it was already set.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let mut slot = self.inner.reason.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(reason);
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.changed.notify_all();
        true
    }

    /// Check whether the token has been set.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// The reason recorded by the first `cancel` call.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.lock().clone()
    }

    /// Block until the token is set or `timeout` elapses. Returns `is_cancelled()`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut slot = self.inner.reason.lock();
        if slot.is_none() {
            self.inner.changed.wait_for(&mut slot, timeout);
        }
        slot.is_some()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Edge-triggered wakeup for the dispatcher loop.
///
/// A `notify` that happens while the dispatcher is busy is remembered, so the
/// next `wait_timeout` returns immediately instead of sleeping.
#[derive(Debug, Default)]
pub(crate) struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    pub(crate) fn notify(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Returns true if woken by `notify`, false on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut pending = self.pending.lock();
        if !*pending {
            self.cond.wait_for(&mut pending, timeout);
        }
        std::mem::replace(&mut *pending, false)
    }
}

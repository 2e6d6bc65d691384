//! Run-wide registry of claimed job names.
//!
//! The same named step can be scheduled from several pipelines (a shared
//! upstream extract, say). Only the first worker to reach a name runs it;
//! later ones wait for that run to finish and reuse its outcome.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::job::{Job, JobState};
use crate::signal::CancellationToken;

pub(crate) enum Claim {
    /// The caller owns the name and must run the job.
    Owner,
    /// Another job already claimed the name.
    Taken(Arc<Job>),
}

#[derive(Default)]
pub(crate) struct JobRegistry {
    claims: Mutex<HashMap<String, Arc<Job>>>,
    finished: Condvar,
}

impl JobRegistry {
    pub(crate) fn claim(&self, job: &Arc<Job>) -> Claim {
        let mut claims = self.claims.lock();
        match claims.get(job.name()) {
            Some(owner) if owner.id() != job.id() => Claim::Taken(Arc::clone(owner)),
            Some(_) => Claim::Owner,
            None => {
                claims.insert(job.name().to_string(), Arc::clone(job));
                Claim::Owner
            }
        }
    }

    /// Wake every waiter so it can re-check its owner's state.
    pub(crate) fn notify_finished(&self) {
        let _claims = self.claims.lock();
        self.finished.notify_all();
    }

    /// Block until `owner` is terminal or the run is cancelled.
    ///
    /// Returns `None` if the run was cancelled first.
    pub(crate) fn wait_for(
        &self,
        owner: &Job,
        token: &CancellationToken,
        poll: Duration,
    ) -> Option<JobState> {
        let mut claims = self.claims.lock();
        loop {
            let state = owner.state();
            if state.is_terminal() {
                return Some(state);
            }
            if token.is_cancelled() {
                return None;
            }
            self.finished.wait_for(&mut claims, poll);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.claims.lock().len()
    }
}

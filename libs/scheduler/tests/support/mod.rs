//! Shared helpers for scheduler integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use jobline_scheduler::{Job, JobError, JobObserver, SchedulerConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started(String),
    Executed(String),
    Failed(String),
    Discarded(String),
}

/// Observer recording every callback in order, plus in-flight peaks.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| f(e)).count()
    }

    pub fn executed(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Executed(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Position of the first event matching `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Executed-callback count per job name.
    pub fn executed_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for name in self.executed() {
            *counts.entry(name).or_insert(0) += 1;
        }
        counts
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl JobObserver for Recorder {
    fn on_started(&self, job: &Job) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.push(Event::Started(job.name().to_string()));
    }

    fn on_executed(&self, job: &Job) {
        if job.state() == jobline_scheduler::JobState::Succeeded {
            self.leave();
        }
        self.push(Event::Executed(job.name().to_string()));
    }

    fn on_failed(&self, job: &Job, _error: &JobError) {
        self.leave();
        self.push(Event::Failed(job.name().to_string()));
    }

    fn on_discarded(&self, job: &Job) {
        self.push(Event::Discarded(job.name().to_string()));
    }
}

/// Route scheduler logs to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("jobline_scheduler=debug")
        .with_test_writer()
        .try_init();
}

pub fn config(max_threads: usize) -> SchedulerConfig {
    init_tracing();
    SchedulerConfig {
        max_threads: Some(max_threads),
        poll_interval_ms: 10,
        ..SchedulerConfig::default()
    }
}

/// A job that sleeps for `ms` milliseconds and succeeds.
pub fn sleeper(name: &str, ms: u64) -> Arc<Job> {
    Job::from_fn(name, move || {
        thread::sleep(Duration::from_millis(ms));
        Ok(())
    })
}

/// A job that sleeps for `ms` milliseconds and fails.
pub fn failing(name: &str, ms: u64) -> Arc<Job> {
    let message = format!("{name} exploded");
    Job::from_fn(name, move || {
        thread::sleep(Duration::from_millis(ms));
        Err(JobError::failed(message.clone()))
    })
}

/// A job that bumps `counter` each time it runs.
pub fn counting(name: &str, counter: &Arc<AtomicUsize>) -> Arc<Job> {
    let counter = Arc::clone(counter);
    Job::from_fn(name, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

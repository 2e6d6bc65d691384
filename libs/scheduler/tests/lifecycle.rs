//! Run start, worker pool growth, and pipeline management.

mod support;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use jobline_scheduler::{
    Job, JobState, Plan, PlanError, RunState, Scheduler, SchedulerConfig, SchedulerError,
};

use support::{config, counting, sleeper, Event, Recorder};

fn wide_plan(prefix: &str, width: usize, ms: u64) -> Plan {
    Plan::new().then(
        (0..width)
            .map(|i| sleeper(&format!("{prefix}-{i}"), ms))
            .collect::<Vec<_>>(),
    )
}

#[test]
fn test_run_is_idempotent() {
    let scheduler = Arc::new(Scheduler::new(config(2)).unwrap());
    let runs = Arc::new(AtomicUsize::new(0));
    scheduler
        .schedule(
            Plan::sequential((0..4).map(|i| counting(&format!("job-{i}"), &runs))),
            None,
        )
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || scheduler.run(None))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    scheduler.run(None).unwrap();

    let summary = scheduler.wait();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

#[test]
fn test_pool_grows_with_demand() {
    let scheduler = Scheduler::new(config(8)).unwrap();
    assert_eq!(scheduler.worker_count(), 0);

    scheduler.schedule(wide_plan("a", 2, 1), Some("a")).unwrap();
    assert_eq!(scheduler.worker_count(), 2);

    scheduler.schedule(wide_plan("b", 5, 1), Some("b")).unwrap();
    assert_eq!(scheduler.worker_count(), 5);

    // Narrower plans never shrink the pool.
    scheduler.schedule(wide_plan("c", 1, 1), Some("c")).unwrap();
    assert_eq!(scheduler.worker_count(), 5);

    scheduler.run(None).unwrap();
    assert!(scheduler.wait().state.is_success());
}

#[test]
fn test_pool_growth_capped_by_max_threads() {
    let scheduler = Scheduler::new(config(3)).unwrap();
    scheduler.schedule(wide_plan("a", 2, 1), Some("a")).unwrap();
    scheduler.schedule(wide_plan("b", 5, 1), Some("b")).unwrap();
    assert_eq!(scheduler.worker_count(), 3);
}

#[test]
fn test_pool_cap_derived_from_cpus() {
    let config = SchedulerConfig::default();
    let cap = config.max_workers();
    let scheduler = Scheduler::new(config).unwrap();

    scheduler.schedule(wide_plan("a", 2, 1), Some("a")).unwrap();
    scheduler.schedule(wide_plan("b", 5, 1), Some("b")).unwrap();
    assert_eq!(scheduler.worker_count(), 5.min(cap));
}

#[test]
fn test_existing_workers_survive_growth() {
    let scheduler = Scheduler::new(config(8)).unwrap();
    let threads = Arc::new(Mutex::new(HashSet::new()));

    let job = |name: String, ms: u64| {
        let threads = Arc::clone(&threads);
        Job::from_fn(name, move || {
            let current = thread::current().name().unwrap_or_default().to_string();
            threads.lock().unwrap().insert(current);
            thread::sleep(Duration::from_millis(ms));
            Ok(())
        })
    };
    let group = |prefix: &str, width: usize, ms: u64| {
        (0..width)
            .map(|i| job(format!("{prefix}-{i}"), ms))
            .collect::<Vec<_>>()
    };

    // The first pipeline keeps the run open while the second is added.
    scheduler
        .schedule(Plan::new().then(group("a", 2, 150)), Some("a"))
        .unwrap();
    scheduler.run(None).unwrap();
    scheduler
        .schedule(Plan::new().then(group("b", 4, 5)), Some("b"))
        .unwrap();
    assert_eq!(scheduler.worker_count(), 4);
    assert!(scheduler.wait().state.is_success());

    let expected: HashSet<String> = (0..4).map(|i| format!("jobline-worker-{i}")).collect();
    let seen = threads.lock().unwrap().clone();
    assert!(seen.is_subset(&expected), "unexpected worker threads: {seen:?}");
}

#[test]
fn test_empty_plan_completes_immediately() {
    let recorder = Recorder::new();
    let scheduler = Scheduler::with_observer(config(4), recorder.clone()).unwrap();

    let pipeline = scheduler.schedule(Plan::new(), None).unwrap();
    assert_eq!(pipeline.len(), 0);
    assert!(pipeline.get().is_none());
    assert_eq!(scheduler.worker_count(), 0);

    scheduler.run(None).unwrap();
    let summary = scheduler
        .wait_timeout(Duration::from_secs(5))
        .expect("empty run should finish");

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded, 0);
    assert!(recorder.events().is_empty());
}

#[test]
fn test_run_with_no_pipelines_completes() {
    let scheduler = Scheduler::new(config(1)).unwrap();
    scheduler.run(None).unwrap();
    assert_eq!(scheduler.wait().state, RunState::Completed);
}

#[test]
fn test_malformed_plan_is_rejected() {
    let scheduler = Scheduler::new(config(2)).unwrap();
    let err = scheduler
        .schedule(
            Plan::new().then(vec![sleeper("a", 0)]).then(Vec::new()),
            Some("etl"),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::Plan(PlanError::EmptyGroup { index: 1 })
    ));
    let pipeline = scheduler.pipeline("etl").expect("pipeline is registered");
    assert!(pipeline.is_empty());
}

#[test]
fn test_shared_job_name_runs_once_across_pipelines() {
    let recorder = Recorder::new();
    let scheduler = Scheduler::with_observer(config(4), recorder.clone()).unwrap();
    let extracts = Arc::new(AtomicUsize::new(0));

    let extract = |counter: &Arc<AtomicUsize>| {
        let counter = Arc::clone(counter);
        Job::from_fn("extract", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(30));
            Ok(())
        })
    };

    for name in ["left", "right"] {
        scheduler
            .schedule(
                Plan::new()
                    .then(vec![extract(&extracts)])
                    .then(vec![sleeper(&format!("load-{name}"), 1)]),
                Some(name),
            )
            .unwrap();
    }

    scheduler.run(None).unwrap();
    let summary = scheduler.wait();

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(extracts.load(Ordering::SeqCst), 1);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(recorder.executed_counts().get("extract"), Some(&2));
}

#[test]
fn test_dedupe_can_be_disabled() {
    let scheduler = Scheduler::new(SchedulerConfig {
        dedupe_by_name: false,
        ..config(2)
    })
    .unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    scheduler
        .schedule(Plan::sequential(vec![counting("same", &runs)]), Some("a"))
        .unwrap();
    scheduler
        .schedule(Plan::sequential(vec![counting("same", &runs)]), Some("b"))
        .unwrap();
    scheduler.run(None).unwrap();

    assert_eq!(scheduler.wait().succeeded, 2);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_paused_pipeline_holds_run_open() {
    let scheduler = Scheduler::new(config(2)).unwrap();
    let job = sleeper("held", 0);
    let pipeline = scheduler
        .schedule(Plan::sequential(vec![Arc::clone(&job)]), Some("held"))
        .unwrap();

    pipeline.pause();
    scheduler.run(None).unwrap();
    assert!(scheduler.wait_timeout(Duration::from_millis(80)).is_none());
    assert_eq!(job.state(), JobState::Pending);

    pipeline.resume();
    let summary = scheduler.wait_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(job.state(), JobState::Succeeded);
}

#[test]
fn test_cancelled_pipeline_drops_queued_groups() {
    let scheduler = Scheduler::new(config(2)).unwrap();
    let dropped = sleeper("dropped", 0);
    let kept = sleeper("kept", 0);

    let pipeline = scheduler
        .schedule(Plan::sequential(vec![Arc::clone(&dropped)]), Some("drop"))
        .unwrap();
    scheduler
        .schedule(Plan::sequential(vec![Arc::clone(&kept)]), Some("keep"))
        .unwrap();
    assert_eq!(pipeline.cancel(), 1);

    scheduler.run(None).unwrap();
    let summary = scheduler.wait();
    assert!(summary.state.is_success());
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.discarded, 1);
    assert_eq!(dropped.state(), JobState::Discarded);
    assert_eq!(kept.state(), JobState::Succeeded);
}

#[test]
fn test_pipeline_cancel_notifies_observer() {
    let recorder = Recorder::new();
    let scheduler = Scheduler::with_observer(config(2), recorder.clone()).unwrap();
    let pipeline = scheduler
        .schedule(
            Plan::new()
                .then(vec![sleeper("first", 0), sleeper("second", 0)])
                .then(vec![sleeper("third", 0)]),
            Some("dropped"),
        )
        .unwrap();

    assert_eq!(pipeline.cancel(), 2);
    assert_eq!(
        recorder.count(|e| matches!(e, Event::Discarded(_))),
        3,
        "{:?}",
        recorder.events()
    );
    assert_eq!(scheduler.summary().discarded, 3);
}

#[test]
fn test_job_shared_with_cancelled_pipeline_does_not_hang() {
    let scheduler = Scheduler::new(config(2)).unwrap();
    let shared = sleeper("shared", 0);
    let after = sleeper("after", 0);

    let a = scheduler
        .schedule(Plan::sequential(vec![Arc::clone(&shared)]), Some("a"))
        .unwrap();
    let b = scheduler
        .schedule(
            Plan::sequential(vec![Arc::clone(&shared), Arc::clone(&after)]),
            Some("b"),
        )
        .unwrap();
    assert_eq!(a.cancel(), 1);

    scheduler.run(None).unwrap();
    let summary = scheduler
        .wait_timeout(Duration::from_secs(5))
        .expect("run must finish once the discarded job's group drains");

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(shared.state(), JobState::Discarded);
    assert_eq!(after.state(), JobState::Succeeded);
    assert!(b.gate().map_or(true, |gate| gate.is_reset()));
}

#[test]
fn test_schedule_while_running() {
    let scheduler = Scheduler::new(config(2)).unwrap();
    scheduler
        .schedule(Plan::sequential(vec![sleeper("slow", 100)]), Some("first"))
        .unwrap();
    scheduler.run(None).unwrap();

    let late = sleeper("late", 0);
    scheduler
        .schedule(Plan::sequential(vec![Arc::clone(&late)]), Some("second"))
        .unwrap();

    let summary = scheduler.wait();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(late.state(), JobState::Succeeded);
}

//! # jobline-scheduler
//!
//! A threaded job scheduler that runs *plans* of jobs through named
//! *pipelines* on a pool of OS worker threads.
//!
//! ## Architecture
//!
//! ```text
//!   schedule(plan, "etl") ──► Pipeline "etl"   ┐
//!   schedule(plan, "ml")  ──► Pipeline "ml"    ├─► Dispatcher ──► pending queue ──► Worker 0..N
//!                             (groups + gate)  ┘   (1 thread)     (crossbeam)       (OS threads)
//!                                    ▲                                                   │
//!                                    └──────────── gate release / cancel ◄───────────────┘
//! ```
//!
//! - A **plan** is an ordered list of **groups**; jobs inside a group may run
//!   concurrently, but a group only starts once the previous group of the
//!   same pipeline has completed.
//! - The **dispatcher** moves one group at a time per pipeline into the
//!   pending queue, guarded by a [`GroupGate`] sized to the group.
//! - **Workers** execute jobs and report through [`JobObserver`]. The first
//!   failure sets the run's [`CancellationToken`]: nothing dispatched after
//!   that point executes and queued jobs are discarded.
//!
//! Jobs cannot be interrupted mid-execution. Long-running tasks should poll
//! [`TaskContext::is_cancelled`] to stop early once the run is cancelled.
//!
//! ## Example
//!
//! ```no_run
//! use jobline_scheduler::{Job, Plan, Scheduler, SchedulerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::new(SchedulerConfig::default())?;
//! let plan = Plan::new()
//!     .then(vec![Job::from_fn("extract-a", || Ok(())), Job::from_fn("extract-b", || Ok(()))])
//!     .then(vec![Job::from_fn("load", || Ok(()))]);
//!
//! scheduler.schedule(plan, Some("etl"))?;
//! scheduler.run(None)?;
//! let summary = scheduler.wait();
//! assert!(summary.state.is_success());
//! # Ok(())
//! # }
//! ```

mod config;
mod dispatcher;
mod error;
mod gate;
mod job;
mod observer;
mod pipeline;
mod plan;
mod registry;
mod scheduler;
mod signal;
mod worker;

pub use config::SchedulerConfig;
pub use error::{JobError, PlanError, Result, SchedulerError};
pub use gate::GroupGate;
pub use job::{Job, JobState, Task, TaskContext};
pub use observer::{JobObserver, NoopObserver};
pub use pipeline::Pipeline;
pub use plan::{JobGroup, Plan};
pub use scheduler::{RunState, RunSummary, Scheduler};
pub use signal::{CancelReason, CancellationToken};

pub use jobline_id::{JobId, PipelineId, RunId};

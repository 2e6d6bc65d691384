//! `jobline run`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use jobline_scheduler::{Job, RunState, Scheduler, SchedulerConfig};
use tracing::info;

use crate::error::CliError;
use crate::manifest::{Manifest, PipelinePlan};
use crate::output::{FailureLog, OutputFormat, RunReport};

/// Exit code for a run stopped by a failing job.
pub const EXIT_FAILED: i32 = 2;

/// Exit code for a run cancelled with Ctrl+C.
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug, Args)]
pub struct RunCommand {
    /// Path to the manifest.
    manifest: PathBuf,

    /// Upper bound on worker threads.
    #[arg(long)]
    max_threads: Option<usize>,

    /// Tell jobs not to reuse cached results (JOBLINE_USE_CACHE=0).
    #[arg(long)]
    no_cache: bool,

    /// Run jobs with the same name separately instead of once per run.
    #[arg(long)]
    no_dedupe: bool,

    /// Working directory for jobs. Defaults to the manifest's directory.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

impl RunCommand {
    pub fn run(self, format: OutputFormat) -> Result<i32> {
        let manifest = Manifest::load(&self.manifest)?;
        let plans = manifest.plans()?;
        let config = self.config(&manifest)?;

        let failures = Arc::new(FailureLog::default());
        let scheduler = Arc::new(
            Scheduler::with_observer(config, failures.clone()).map_err(CliError::from)?,
        );

        let mut jobs: Vec<(String, usize, Arc<Job>)> = Vec::new();
        for PipelinePlan { id, plan } in plans {
            for (index, group) in plan.groups().iter().enumerate() {
                jobs.extend(
                    group
                        .jobs()
                        .iter()
                        .map(|job| (id.to_string(), index, Arc::clone(job))),
                );
            }
            scheduler
                .schedule(plan, Some(id.as_str()))
                .map_err(CliError::from)?;
        }

        install_interrupt_handler(&scheduler)?;

        info!(
            manifest = %self.manifest.display(),
            pipelines = scheduler.pipelines().len(),
            jobs = jobs.len(),
            workers = scheduler.worker_count(),
            "Starting run"
        );
        let started_at = Utc::now();
        let use_cache = self.no_cache.then_some(false);
        scheduler.run(use_cache).map_err(CliError::from)?;
        let summary = scheduler.wait();

        let report = RunReport::new(summary, started_at, &jobs, &failures);
        report.print(format);

        Ok(match report.summary.state {
            RunState::Completed => 0,
            RunState::Cancelled => EXIT_CANCELLED,
            RunState::Failed => EXIT_FAILED,
            RunState::Idle | RunState::Running => 1,
        })
    }

    /// Manifest `[scheduler]` table (or `JOBLINE_*` variables), then flags.
    fn config(&self, manifest: &Manifest) -> Result<SchedulerConfig> {
        let mut config = match &manifest.scheduler {
            Some(config) => config.clone(),
            None => SchedulerConfig::from_env().map_err(CliError::from)?,
        };

        if let Some(max_threads) = self.max_threads {
            config.max_threads = Some(max_threads);
        }
        if self.no_dedupe {
            config.dedupe_by_name = false;
        }
        if let Some(workspace) = &self.workspace {
            config.workspace = Some(workspace.clone());
        }
        if config.workspace.is_none() {
            config.workspace = manifest_dir(&self.manifest);
        }

        config.validate().map_err(CliError::from)?;
        Ok(config)
    }
}

fn manifest_dir(path: &Path) -> Option<PathBuf> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

fn install_interrupt_handler(scheduler: &Arc<Scheduler>) -> Result<()> {
    let scheduler = Arc::clone(scheduler);
    ctrlc::set_handler(move || {
        if scheduler.cancel() {
            eprintln!(
                "{}",
                "Cancelling run; waiting for running jobs to stop...".yellow()
            );
        }
    })
    .context("failed to install Ctrl+C handler")
}

//! Output formatting for CLI commands.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use jobline_scheduler::{Job, JobError, JobId, JobObserver, JobState, RunState, RunSummary};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text and tables.
    #[default]
    Text,
    /// JSON.
    Json,
}

/// Collects failure messages so the report can show why a job failed.
#[derive(Default)]
pub struct FailureLog {
    errors: Mutex<HashMap<JobId, String>>,
}

impl FailureLog {
    pub fn error_for(&self, job: JobId) -> Option<String> {
        self.errors.lock().ok()?.get(&job).cloned()
    }
}

impl JobObserver for FailureLog {
    fn on_failed(&self, job: &Job, error: &JobError) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.insert(job.id(), error.to_string());
        }
    }
}

#[derive(Debug, Clone, Serialize, Tabled)]
pub struct JobRow {
    #[tabled(rename = "Pipeline")]
    pub pipeline: String,

    #[tabled(rename = "Group")]
    pub group: usize,

    #[tabled(rename = "Job")]
    pub job: String,

    #[tabled(rename = "State")]
    pub state: JobState,

    #[tabled(rename = "Error", display = "display_option")]
    pub error: Option<String>,
}

fn display_option(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "-".to_string())
}

/// Everything printed at the end of `jobline run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub jobs: Vec<JobRow>,
}

impl RunReport {
    pub fn new(
        summary: RunSummary,
        started_at: DateTime<Utc>,
        jobs: &[(String, usize, Arc<Job>)],
        failures: &FailureLog,
    ) -> Self {
        let finished_at = Utc::now();
        let jobs = jobs
            .iter()
            .map(|(pipeline, group, job)| JobRow {
                pipeline: pipeline.clone(),
                group: *group,
                job: job.name().to_string(),
                state: job.state(),
                error: failures.error_for(job.id()),
            })
            .collect();

        Self {
            summary,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds(),
            jobs,
        }
    }

    pub fn print(&self, format: OutputFormat) {
        match format {
            OutputFormat::Text => self.print_text(),
            OutputFormat::Json => print_json(self),
        }
    }

    fn print_text(&self) {
        if !self.jobs.is_empty() {
            println!("{}", Table::new(&self.jobs));
        }

        let s = &self.summary;
        let counts = format!(
            "{} succeeded, {} skipped, {} discarded in {}ms",
            s.succeeded, s.skipped, s.discarded, self.duration_ms
        );
        match s.state {
            RunState::Completed => print_success(&format!("Run {} completed: {counts}", s.run_id)),
            RunState::Failed => {
                let job = s.failed_job.as_deref().unwrap_or("scheduler");
                println!(
                    "{} Run {} failed at '{job}': {counts}",
                    "Failed:".red().bold(),
                    s.run_id
                );
            }
            other => println!(
                "{} Run {} {other}: {counts}",
                "Stopped:".yellow().bold(),
                s.run_id
            ),
        }
    }
}

/// Print any serializable value as pretty JSON.
pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("{} failed to serialize output: {e}", "Error:".red().bold()),
    }
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

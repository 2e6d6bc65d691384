//! Pipeline manifests.
//!
//! A manifest is a TOML file listing pipelines, each an ordered list of
//! groups of shell commands:
//!
//! ```toml
//! [scheduler]
//! max_threads = 4
//!
//! [[pipelines]]
//! id = "etl"
//!
//! [[pipelines.groups]]
//! jobs = [
//!     { name = "extract-a", command = ["./extract.sh", "a"] },
//!     { name = "extract-b", command = ["./extract.sh", "b"] },
//! ]
//!
//! [[pipelines.groups]]
//! jobs = [{ name = "load", command = ["./load.sh"], env = { TARGET = "warehouse" } }]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobline_id::PipelineId;
use jobline_scheduler::{Job, Plan, SchedulerConfig};
use serde::Deserialize;

use crate::error::CliError;
use crate::task::CommandTask;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Scheduler settings; environment variables are used when absent.
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,

    #[serde(default)]
    pub pipelines: Vec<PipelineSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    /// Pipeline name. Omitted means the default pipeline.
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub groups: Vec<GroupSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    pub jobs: Vec<JobSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSpec {
    pub name: String,

    /// Program followed by its arguments.
    pub command: Vec<String>,

    /// Working directory, relative to the scheduler workspace.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// A manifest pipeline turned into a schedulable plan.
pub struct PipelinePlan {
    pub id: PipelineId,
    pub plan: Plan,
}

impl Manifest {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("invalid manifest TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to parse manifest: {}", path.display()))
    }

    /// Total number of jobs across every pipeline.
    pub fn job_count(&self) -> usize {
        self.pipelines
            .iter()
            .flat_map(|p| &p.groups)
            .map(|g| g.jobs.len())
            .sum()
    }

    /// Build one plan per pipeline, checking every name and command.
    pub fn plans(&self) -> Result<Vec<PipelinePlan>, CliError> {
        if self.pipelines.is_empty() {
            return Err(CliError::manifest("no pipelines defined"));
        }

        self.pipelines
            .iter()
            .enumerate()
            .map(|(index, spec)| spec.to_plan(index))
            .collect()
    }
}

impl PipelineSpec {
    fn to_plan(&self, index: usize) -> Result<PipelinePlan, CliError> {
        let id = match &self.id {
            Some(name) => PipelineId::parse(name).map_err(|e| {
                CliError::manifest(format!("pipeline #{index}: invalid id '{name}': {e}"))
            })?,
            None => PipelineId::default(),
        };

        let mut plan = Plan::new();
        for (group_index, group) in self.groups.iter().enumerate() {
            let jobs = group
                .jobs
                .iter()
                .map(|job| job.to_job(&id, group_index))
                .collect::<Result<Vec<_>, _>>()?;
            plan = plan.then(jobs);
        }

        plan.validate()
            .map_err(|e| CliError::manifest(format!("pipeline '{id}': {e}")))?;
        Ok(PipelinePlan { id, plan })
    }
}

impl JobSpec {
    fn to_job(&self, pipeline: &PipelineId, group: usize) -> Result<std::sync::Arc<Job>, CliError> {
        if self.name.trim().is_empty() {
            return Err(CliError::manifest(format!(
                "pipeline '{pipeline}', group {group}: job name is empty"
            )));
        }
        let Some((program, args)) = self.command.split_first() else {
            return Err(CliError::manifest(format!(
                "pipeline '{pipeline}', job '{}': command is empty",
                self.name
            )));
        };

        let task = CommandTask::new(program, args)
            .cwd(self.cwd.clone())
            .envs(self.env.clone());
        Ok(Job::new(self.name.clone(), task))
    }
}

//! `jobline validate`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::error::CliError;
use crate::manifest::Manifest;
use crate::output::{print_json, print_success, OutputFormat};

#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Path to the manifest.
    manifest: PathBuf,
}

#[derive(Debug, Serialize, Tabled)]
struct PipelineRow {
    #[tabled(rename = "Pipeline")]
    pipeline: String,

    #[tabled(rename = "Groups")]
    groups: usize,

    #[tabled(rename = "Jobs")]
    jobs: usize,

    #[tabled(rename = "Widest group")]
    max_width: usize,
}

impl ValidateCommand {
    pub fn run(self, format: OutputFormat) -> Result<()> {
        let manifest = Manifest::load(&self.manifest)?;
        if let Some(config) = &manifest.scheduler {
            config
                .validate()
                .map_err(|e| CliError::manifest(format!("[scheduler]: {e}")))?;
        }

        let rows: Vec<PipelineRow> = manifest
            .plans()?
            .into_iter()
            .map(|p| PipelineRow {
                pipeline: p.id.to_string(),
                groups: p.plan.len(),
                jobs: p.plan.job_count(),
                max_width: p.plan.max_width(),
            })
            .collect();

        match format {
            OutputFormat::Json => print_json(&rows),
            OutputFormat::Text => {
                println!("{}", Table::new(&rows));
                print_success(&format!(
                    "{} is valid ({} jobs in {} pipelines)",
                    self.manifest.display(),
                    manifest.job_count(),
                    rows.len()
                ));
            }
        }
        Ok(())
    }
}

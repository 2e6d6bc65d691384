//! CLI commands.

mod run;
mod validate;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// jobline - run ordered groups of jobs on a pool of worker threads.
#[derive(Debug, Parser)]
#[command(name = "jobline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format for reports (text or json).
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log line format (text or json).
    #[arg(long, global = true, value_enum, env = "JOBLINE_LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log at debug level unless JOBLINE_LOG or RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every pipeline in a manifest.
    Run(run::RunCommand),

    /// Check a manifest without running it.
    Validate(validate::ValidateCommand),
}

impl Cli {
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Run the command. Returns the process exit code.
    pub fn run(self) -> Result<i32> {
        match self.command {
            Commands::Run(cmd) => cmd.run(self.format),
            Commands::Validate(cmd) => cmd.run(self.format).map(|()| 0),
        }
    }
}

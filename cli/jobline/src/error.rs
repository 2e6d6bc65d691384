//! Error handling and display for the CLI.

use colored::Colorize;
use jobline_scheduler::SchedulerError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

impl CliError {
    pub fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  {} {}", "caused by:".dimmed(), cause);
    }

    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        match cli_err {
            CliError::Manifest(_) => {
                eprintln!(
                    "\n{}",
                    "Hint: Run `jobline validate <manifest>` to check a manifest without running it."
                        .yellow()
                );
            }
            CliError::Scheduler(SchedulerError::Config(_)) => {
                eprintln!(
                    "\n{}",
                    "Hint: Check the [scheduler] table and JOBLINE_* environment variables.".yellow()
                );
            }
            _ => {}
        }
    }
}

//! jobline - run job pipelines described in a TOML manifest.
//!
//! Each pipeline is an ordered list of groups; the jobs of a group run in
//! parallel, and the first failing job stops the whole run.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod logging;
mod manifest;
mod output;
mod task;

use commands::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_format(), cli.verbose());

    match cli.run() {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Print error in a user-friendly way
            error::print_error(&e);
            std::process::exit(1);
        }
    }
}

//! Jobs backed by child processes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use jobline_scheduler::{JobError, Task, TaskContext};
use tracing::{debug, warn};

/// How often a running child is checked for exit and for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Runs a program; a non-zero exit status fails the job.
///
/// The child is killed if the run is cancelled while it is running.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandTask {
    pub fn new(program: impl Into<String>, args: &[String]) -> Self {
        Self {
            program: program.into(),
            args: args.to_vec(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn envs(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    fn command(&self, ctx: &TaskContext) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .env("JOBLINE_JOB", ctx.job_name())
            .env("JOBLINE_JOB_ID", ctx.job_id().to_string())
            .env("JOBLINE_PIPELINE", ctx.pipeline().as_str())
            .env("JOBLINE_USE_CACHE", if ctx.use_cache() { "1" } else { "0" })
            .stdin(Stdio::null());

        let cwd = match (&self.cwd, ctx.workspace()) {
            (Some(cwd), Some(workspace)) if cwd.is_relative() => Some(workspace.join(cwd)),
            (Some(cwd), _) => Some(cwd.clone()),
            (None, workspace) => workspace.map(PathBuf::from),
        };
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command
    }

    fn wait(&self, child: &mut Child, ctx: &TaskContext) -> Result<ExitStatus, JobError> {
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if ctx.is_cancelled() {
                warn!(job = %ctx.job_name(), pid = child.id(), "Run cancelled, killing child process");
                child.kill()?;
                child.wait()?;
                return Err(JobError::Cancelled);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Task for CommandTask {
    fn run(&self, ctx: &TaskContext) -> Result<(), JobError> {
        let mut child = self.command(ctx).spawn().map_err(|e| {
            JobError::failed(format!("failed to start '{}': {e}", self.program))
        })?;
        debug!(job = %ctx.job_name(), program = %self.program, pid = child.id(), "Child process started");

        let status = self.wait(&mut child, ctx)?;
        if status.success() {
            return Ok(());
        }

        match status.code() {
            Some(code) => Err(JobError::failed(format!(
                "'{}' exited with status {code}",
                self.program
            ))),
            None => Err(JobError::failed(format!(
                "'{}' was terminated by a signal",
                self.program
            ))),
        }
    }
}

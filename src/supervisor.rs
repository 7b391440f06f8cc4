//! Runs each video job in its own process with a hard wall clock limit.

use crate::job::WorkerJob;
use anyhow::Result;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Environment variable holding the dynamic library search path.
#[cfg(windows)]
pub const LIBRARY_PATH_VAR: &str = "PATH";
#[cfg(not(windows))]
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Exited with status zero within the time limit.
    Succeeded,
    /// Exited non-zero or was killed by a signal (`code` is `None` then).
    Failed { code: Option<i32> },
    /// Killed after exceeding the time limit.
    TimedOut,
    /// The process could not be started.
    SpawnFailed(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Self::Succeeded
        } else {
            Self::Failed {
                code: status.code(),
            }
        }
    }
}

/// A process invocation: program, arguments and extra environment.
#[derive(Debug, Clone)]
pub struct JobCommand {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl JobCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Re-invoke `exe` as a worker for `job`, with `library_dirs` in front of
    /// the child's library search path.
    pub fn worker(exe: &Path, job: &WorkerJob, library_dirs: &[PathBuf]) -> Result<Self> {
        let mut command = Self::new(exe).arg("worker").arg("--job").arg(job.to_json()?);
        if let Some(search_path) = library_search_path(library_dirs)? {
            command = command.env(LIBRARY_PATH_VAR, search_path);
        }
        Ok(command)
    }
}

/// Prepend `dirs` to the current library search path, `None` if empty.
pub fn library_search_path(dirs: &[PathBuf]) -> Result<Option<OsString>> {
    if dirs.is_empty() {
        return Ok(None);
    }
    let existing = std::env::var_os(LIBRARY_PATH_VAR);
    let inherited = existing.iter().flat_map(std::env::split_paths);
    let joined = std::env::join_paths(dirs.iter().cloned().chain(inherited))?;
    Ok(Some(joined))
}

/// Spawn `command` and wait for it, at most `timeout` when given.
///
/// On timeout the process is killed and reaped before this returns.
pub async fn run(command: &JobCommand, timeout: Option<Duration>) -> JobOutcome {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(command.envs.iter().cloned())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return JobOutcome::SpawnFailed(format!(
                "failed to spawn {}: {e}",
                command.program.display()
            ))
        }
    };

    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(waited) => waited,
            Err(_elapsed) => {
                tracing::warn!("Job exceeded {:?}, killing pid {:?}", limit, child.id());
                if let Err(e) = child.start_kill() {
                    tracing::warn!("Failed to kill job: {}", e);
                }
                // Reap so no zombie outlives the timeout.
                let _ = child.wait().await;
                return JobOutcome::TimedOut;
            }
        },
        None => child.wait().await,
    };

    match waited {
        Ok(status) => JobOutcome::from_status(status),
        Err(e) => {
            tracing::warn!("I/O error waiting for job: {}", e);
            JobOutcome::Failed { code: None }
        }
    }
}

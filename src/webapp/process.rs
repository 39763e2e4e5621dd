//! Spawned webapp process
//!
//! The process writes stdout and stderr into a single log file owned by its
//! handle; nothing else writes to that file while the process runs.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::common::{paths, Error, Result};

use super::probe::{ExitWatch, Liveness};

/// What to launch and where its output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Variables set on top of the inherited environment
    pub environment: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub log_file: PathBuf,
}

impl ProcessSpec {
    /// Spec with the default log file and no overrides
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            environment: BTreeMap::new(),
            working_directory: None,
            log_file: paths::default_webapp_log(),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// The command as a single line, for logs
    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }

    /// Resolve the program to run
    ///
    /// Bare names are looked up in PATH; anything with a path separator is
    /// used as given (relative to the working directory).
    fn program(&self) -> Result<PathBuf> {
        let program = self
            .command
            .first()
            .ok_or_else(|| Error::Config("Webapp command is empty".to_string()))?;
        if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
            return Ok(PathBuf::from(program));
        }
        which::which(program).map_err(|e| Error::spawn_failed(program, e))
    }
}

/// Lifecycle of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Spawned, readiness not yet established
    Starting,
    Ready,
    /// Never became ready; already torn down
    Failed,
    Stopped,
}

/// One spawned OS process and its log file
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    log_file: PathBuf,
    _log: File,
    state: ProcessState,
}

impl ProcessHandle {
    /// Spawn the process described by `spec`
    ///
    /// Returns as soon as the process exists, in the `Starting` state.
    pub fn launch(spec: &ProcessSpec) -> Result<Self> {
        let program = spec.program()?;

        paths::ensure_parent_dir(&spec.log_file).map_err(|e| Error::log_file(&spec.log_file, &e))?;
        let log = File::create(&spec.log_file).map_err(|e| Error::log_file(&spec.log_file, &e))?;
        let stdout = log
            .try_clone()
            .map_err(|e| Error::log_file(&spec.log_file, &e))?;
        let stderr = log
            .try_clone()
            .map_err(|e| Error::log_file(&spec.log_file, &e))?;

        let mut cmd = Command::new(&program);
        cmd.args(&spec.command[1..])
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &spec.working_directory {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::spawn_failed(&spec.command[0], e))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Internal("Spawned process has no pid".to_string()))?;

        tracing::info!(
            pid,
            command = %spec.display_command(),
            log_file = %spec.log_file.display(),
            "Webapp process spawned"
        );

        Ok(Self {
            child,
            pid,
            log_file: spec.log_file.clone(),
            _log: log,
            state: ProcessState::Starting,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ProcessState) {
        tracing::trace!(pid = self.pid, from = ?self.state, to = ?state, "Process state change");
        self.state = state;
    }

    /// Whether the pid may still be signalled
    pub fn is_live(&self) -> bool {
        matches!(self.state, ProcessState::Starting | ProcessState::Ready)
    }

    /// Collect the exit status once the process is gone
    pub async fn reap(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }
}

impl ExitWatch for ProcessHandle {
    fn liveness(&mut self) -> Result<Liveness> {
        Ok(match self.child.try_wait()? {
            Some(status) => Liveness::Exited(status.code()),
            None => Liveness::Running,
        })
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.is_live() {
            tracing::warn!(
                pid = self.pid,
                "Webapp handle dropped while the process may still be running"
            );
        }
    }
}

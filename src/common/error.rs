//! Error types for the TestNet runner
//!
//! Every error carries the artifact needed to diagnose the failure without
//! re-running the system under test: the run id, the webapp log path, or the
//! last transport failure.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the TestNet runner
#[derive(Error, Debug)]
pub enum Error {
    // === Result Channel Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    // === Run Errors ===
    #[error("Test run {run_id} did not finish within {elapsed_secs} seconds")]
    RunTimeout { run_id: String, elapsed_secs: u64 },

    #[error("Test run {run_id} still unfinished after {polls} polls")]
    PollLimit { run_id: String, polls: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{failed} of {total} test(s) failed")]
    TestsFailed { failed: usize, total: usize },

    // === Webapp Errors ===
    #[error("Webapp failed to start: {0}")]
    Startup(StartupFailure),

    #[error("Process {pid} survived {attempts} termination attempt(s)")]
    Termination { pid: u32, attempts: u32 },

    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Failed to open log file '{path}': {error}")]
    LogFile { path: String, error: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a webapp never reached the ready state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupFailure {
    /// The process exited before the settle delay ran out
    EarlyExit {
        exit_code: Option<i32>,
        log_file: PathBuf,
    },
    /// The startup URL never answered within the timeout
    ProbeTimeout {
        timeout: Duration,
        startup_url: String,
        log_file: PathBuf,
        last_error: Option<String>,
    },
}

impl StartupFailure {
    /// Log file the webapp was writing to
    pub fn log_file(&self) -> &PathBuf {
        match self {
            Self::EarlyExit { log_file, .. } | Self::ProbeTimeout { log_file, .. } => log_file,
        }
    }
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EarlyExit {
                exit_code,
                log_file,
            } => {
                let code = exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "killed by signal".to_string());
                write!(
                    f,
                    "server terminated early (returncode: {}), probably due to an error. \
                     Check the log for details: {}",
                    code,
                    log_file.display()
                )
            }
            Self::ProbeTimeout {
                timeout,
                startup_url,
                log_file,
                last_error,
            } => {
                write!(
                    f,
                    "no successful response from {} after {:.1} seconds. \
                     Check the log for details: {}",
                    startup_url,
                    timeout.as_secs_f64(),
                    log_file.display()
                )?;
                if let Some(err) = last_error {
                    write!(f, " (last error: {})", err)?;
                }
                Ok(())
            }
        }
    }
}

impl Error {
    /// Create a remote error from an HTTP status and optional server message
    pub fn remote(status: u16, message: Option<&str>) -> Self {
        Self::Remote {
            status,
            message: message.unwrap_or("<no message>").to_string(),
        }
    }

    /// Create a spawn error
    pub fn spawn_failed(program: &str, reason: impl fmt::Display) -> Self {
        Self::Spawn {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a log file error
    pub fn log_file(path: &std::path::Path, error: &io::Error) -> Self {
        Self::LogFile {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Exit code used by the CLI for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TestsFailed { .. } => 2,
            Error::Startup(_) => 3,
            Error::Termination { .. } => 4,
            Error::RunTimeout { .. } | Error::PollLimit { .. } => 5,
            Error::Cancelled => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_early_exit_mentions_log_path() {
        let err = Error::Startup(StartupFailure::EarlyExit {
            exit_code: Some(3),
            log_file: PathBuf::from("/tmp/webapp.log"),
        });
        let msg = err.to_string();
        assert!(msg.contains("returncode: 3"));
        assert!(msg.contains("/tmp/webapp.log"));
    }

    #[test]
    fn test_probe_timeout_mentions_last_error() {
        let failure = StartupFailure::ProbeTimeout {
            timeout: Duration::from_secs(5),
            startup_url: "http://127.0.0.1:9877/".to_string(),
            log_file: PathBuf::from("/tmp/webapp.log"),
            last_error: Some("connection refused".to_string()),
        };
        let msg = failure.to_string();
        assert!(msg.contains("http://127.0.0.1:9877/"));
        assert!(msg.contains("5.0 seconds"));
        assert!(msg.contains("connection refused"));
        assert_eq!(failure.log_file(), &PathBuf::from("/tmp/webapp.log"));
    }

    #[test]
    fn test_remote_without_message() {
        let err = Error::remote(502, None);
        assert_eq!(err.to_string(), "Server returned HTTP 502: <no message>");
    }
}

//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// TestNet server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Webapp startup settings
    #[serde(default)]
    pub webapp: WebappConfig,

    /// Webapp shutdown settings
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

/// TestNet server settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the server, e.g. `http://jstestnet.example.com/`
    #[serde(default)]
    pub url: Option<String>,

    /// Delay between two status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Give up after this many status polls (unbounded when unset)
    #[serde(default)]
    pub max_polls: Option<u64>,

    /// Overall deadline for a run (unbounded when unset)
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_ms: default_poll_interval(),
            max_polls: None,
            run_timeout_secs: None,
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

/// Webapp startup settings
#[derive(Debug, Deserialize)]
pub struct WebappConfig {
    /// How long to let the webapp settle when no startup URL is given
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Delay between two startup URL probes
    #[serde(default = "default_probe_wait")]
    pub probe_wait_ms: u64,

    /// Total time allowed for the startup URL to answer
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Where the webapp's stdout/stderr go
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for WebappConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            probe_wait_ms: default_probe_wait(),
            probe_timeout_secs: default_probe_timeout(),
            log_file: None,
        }
    }
}

fn default_settle_delay() -> u64 {
    2000
}
fn default_probe_wait() -> u64 {
    1000
}
fn default_probe_timeout() -> u64 {
    15
}

/// Termination escalation style
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownStyle {
    /// Re-send SIGINT until the process exits or attempts run out
    #[default]
    Retry,
    /// Send SIGINT once and wait for exit up to a ceiling
    Wait,
}

/// Webapp shutdown settings
#[derive(Debug, Deserialize)]
pub struct ShutdownConfig {
    #[serde(default)]
    pub style: ShutdownStyle,

    /// Signals sent per process before giving up (retry style)
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Delay between two signals (retry style)
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// How long to wait for exit after the signal (wait style)
    #[serde(default = "default_wait_ceiling")]
    pub wait_ceiling_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            style: ShutdownStyle::default(),
            attempts: default_attempts(),
            interval_ms: default_interval(),
            wait_ceiling_secs: default_wait_ceiling(),
        }
    }
}

fn default_attempts() -> u32 {
    25
}
fn default_interval() -> u64 {
    500
}
fn default_wait_ceiling() -> u64 {
    10
}

impl ServerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::Config(format!(
            "Failed to read '{}': {}",
            path.display(),
            e
        )))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

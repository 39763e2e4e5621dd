//! Startup readiness strategies
//!
//! A freshly spawned webapp is either given a fixed settle delay and checked
//! for an early exit, or its startup URL is polled until it answers.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result, StartupFailure};

/// Liveness of a supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Running,
    /// Exited with a code, or `None` when killed by a signal
    Exited(Option<i32>),
}

/// Something whose early exit can be detected without blocking
pub trait ExitWatch: Send {
    fn liveness(&mut self) -> Result<Liveness>;
}

/// Decides when a started process is ready to serve
#[async_trait]
pub trait ReadinessStrategy: Send + Sync {
    /// Block until the process is ready, or fail with a startup error
    async fn wait_ready(
        &self,
        process: &mut dyn ExitWatch,
        log_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

fn early_exit(code: Option<i32>, log_file: &Path) -> Error {
    Error::Startup(StartupFailure::EarlyExit {
        exit_code: code,
        log_file: log_file.to_path_buf(),
    })
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Sleep long enough for the process to bind its port, then check it is
/// still running
#[derive(Debug, Clone)]
pub struct SettleDelay {
    pub delay: Duration,
}

impl Default for SettleDelay {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
        }
    }
}

#[async_trait]
impl ReadinessStrategy for SettleDelay {
    async fn wait_ready(
        &self,
        process: &mut dyn ExitWatch,
        log_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        pause(self.delay, cancel).await?;
        match process.liveness()? {
            Liveness::Running => Ok(()),
            Liveness::Exited(code) => Err(early_exit(code, log_file)),
        }
    }

    fn describe(&self) -> String {
        format!("settle delay of {:.1}s", self.delay.as_secs_f64())
    }
}

/// A single readiness check against a URL
#[async_trait]
pub trait Probe: Send + Sync {
    /// `Ok` once the URL answered successfully, otherwise why not
    async fn check(&self, url: &str) -> std::result::Result<(), String>;
}

/// Probe issuing a GET with a reqwest client
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    /// Create a probe whose requests give up after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, url: &str) -> std::result::Result<(), String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        // dropping the response releases the connection
        drop(response);
        if status.is_success() || status.is_redirection() {
            Ok(())
        } else {
            Err(format!("HTTP {}", status))
        }
    }
}

/// Poll the startup URL until it answers or `timeout` elapses
#[derive(Debug, Clone)]
pub struct UrlProbe<P = HttpProbe> {
    pub url: String,
    pub wait: Duration,
    pub timeout: Duration,
    probe: P,
}

impl UrlProbe<HttpProbe> {
    pub fn new(url: impl Into<String>, wait: Duration, timeout: Duration) -> Result<Self> {
        let probe = HttpProbe::new(wait.max(Duration::from_secs(1)))?;
        Ok(Self::with_probe(url, wait, timeout, probe))
    }
}

impl<P: Probe> UrlProbe<P> {
    pub fn with_probe(url: impl Into<String>, wait: Duration, timeout: Duration, probe: P) -> Self {
        Self {
            url: url.into(),
            wait,
            timeout,
            probe,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }
}

#[async_trait]
impl<P: Probe> ReadinessStrategy for UrlProbe<P> {
    async fn wait_ready(
        &self,
        process: &mut dyn ExitWatch,
        log_file: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let mut last_error = None;
        let mut attempt: u32 = 0;

        loop {
            pause(self.wait, cancel).await?;
            attempt += 1;

            // no point in waiting out the timeout for a dead process
            if let Liveness::Exited(code) = process.liveness()? {
                return Err(early_exit(code, log_file));
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.probe.check(&self.url) => outcome,
            };
            match outcome {
                Ok(()) => {
                    tracing::debug!(url = %self.url, attempt, "Startup URL answered");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(url = %self.url, attempt, error = %e, "Startup URL not ready");
                    last_error = Some(e);
                }
            }

            if started.elapsed() >= self.timeout {
                return Err(Error::Startup(StartupFailure::ProbeTimeout {
                    timeout: self.timeout,
                    startup_url: self.url.clone(),
                    log_file: log_file.to_path_buf(),
                    last_error,
                }));
            }
        }
    }

    fn describe(&self) -> String {
        format!("GET {} (timeout {:.1}s)", self.url, self.timeout.as_secs_f64())
    }
}

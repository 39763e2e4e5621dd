//! Webapp under test: start, probe, and tear down
//!
//! [`WebappServer`] ties a [`ProcessSpec`] to a readiness strategy and a
//! terminator. The strategy is chosen when the server is built: a startup
//! URL selects active probing, otherwise a settle delay is used.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::config::WebappConfig;
use crate::common::{Error, Result, StartupFailure};

use super::probe::{ReadinessStrategy, SettleDelay, UrlProbe};
use super::process::{ProcessHandle, ProcessSpec, ProcessState};
use super::terminate::{Escalation, Terminator};

/// A web application server run as a subprocess
pub struct WebappServer {
    spec: ProcessSpec,
    readiness: Box<dyn ReadinessStrategy>,
    terminator: Terminator,
    handle: Option<ProcessHandle>,
}

impl WebappServer {
    pub fn builder(spec: ProcessSpec) -> WebappServerBuilder {
        WebappServerBuilder::new(spec)
    }

    /// Create a server with an explicit readiness strategy and terminator
    pub fn new(
        spec: ProcessSpec,
        readiness: Box<dyn ReadinessStrategy>,
        terminator: Terminator,
    ) -> Self {
        Self {
            spec,
            readiness,
            terminator,
            handle: None,
        }
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    pub fn log_file(&self) -> &Path {
        &self.spec.log_file
    }

    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().map(ProcessHandle::pid)
    }

    pub fn state(&self) -> Option<ProcessState> {
        self.handle.as_ref().map(ProcessHandle::state)
    }

    /// Launch the webapp and wait until it is ready
    ///
    /// If the webapp never becomes ready, whatever is left of its process
    /// tree is torn down once and the handle is marked failed. A webapp that
    /// exited on its own is not signalled at all.
    pub async fn startup(&mut self, cancel: &CancellationToken) -> Result<()> {
        if let Some(handle) = &self.handle {
            if handle.is_live() {
                return Err(Error::Internal(format!(
                    "Webapp already started (pid {})",
                    handle.pid()
                )));
            }
        }

        let mut handle = ProcessHandle::launch(&self.spec)?;
        tracing::info!(
            pid = handle.pid(),
            readiness = %self.readiness.describe(),
            "Waiting for webapp to start"
        );

        let log_file = self.spec.log_file.clone();
        let outcome = self
            .readiness
            .wait_ready(&mut handle, &log_file, cancel)
            .await;

        match outcome {
            Ok(()) => {
                handle.set_state(ProcessState::Ready);
                tracing::info!(pid = handle.pid(), "Webapp is ready");
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!(pid = handle.pid(), error = %e, "Webapp failed to start");
                if matches!(e, Error::Startup(StartupFailure::EarlyExit { .. })) {
                    // already reaped; the pid may belong to someone else by now
                    handle.set_state(ProcessState::Failed);
                } else {
                    self.tear_down_failed(&mut handle).await;
                }
                self.handle = Some(handle);
                Err(e)
            }
        }
    }

    /// Terminate what is left of a webapp that never became ready
    ///
    /// Only a complete teardown marks the handle failed. Otherwise it stays
    /// live so that `shutdown` tries again.
    async fn tear_down_failed(&self, handle: &mut ProcessHandle) {
        let pid = handle.pid();
        // A fresh token: cleanup must run even when startup was cancelled
        if let Err(e) = self
            .terminator
            .terminate(pid, &CancellationToken::new())
            .await
        {
            tracing::warn!(pid, error = %e, "Could not clean up failed webapp, shutdown will retry");
            return;
        }
        match handle.reap().await {
            Ok(code) => tracing::debug!(pid, exit_code = ?code, "Failed webapp reaped"),
            Err(e) => tracing::warn!(pid, error = %e, "Could not reap failed webapp"),
        }
        handle.set_state(ProcessState::Failed);
    }

    /// Terminate the webapp's process tree
    ///
    /// A no-op when nothing is running: never started, already stopped, or
    /// torn down after a failed startup. On failure the handle keeps its
    /// state so shutdown may be retried.
    pub async fn shutdown(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            tracing::debug!("Webapp never started, nothing to shut down");
            return Ok(());
        };
        if !handle.is_live() {
            tracing::debug!(pid = handle.pid(), state = ?handle.state(), "Webapp not running");
            return Ok(());
        }

        let pid = handle.pid();
        tracing::info!(pid, "Shutting down webapp");
        self.terminator.terminate(pid, cancel).await?;

        let code = handle.reap().await?;
        handle.set_state(ProcessState::Stopped);
        tracing::info!(pid, exit_code = ?code, "Webapp stopped");
        Ok(())
    }
}

/// Builder selecting the readiness strategy and escalation
pub struct WebappServerBuilder {
    spec: ProcessSpec,
    startup_url: Option<String>,
    timeout: Option<Duration>,
    settle_delay: Duration,
    probe_wait: Duration,
    probe_timeout: Duration,
    escalation: Escalation,
}

impl WebappServerBuilder {
    pub fn new(spec: ProcessSpec) -> Self {
        let defaults = WebappConfig::default();
        Self {
            spec,
            startup_url: None,
            timeout: None,
            settle_delay: Duration::from_millis(defaults.settle_delay_ms),
            probe_wait: Duration::from_millis(defaults.probe_wait_ms),
            probe_timeout: Duration::from_secs(defaults.probe_timeout_secs),
            escalation: Escalation::default(),
        }
    }

    /// Apply delays and timeouts from the `[webapp]` config section
    pub fn config(mut self, config: &WebappConfig) -> Self {
        self.settle_delay = Duration::from_millis(config.settle_delay_ms);
        self.probe_wait = Duration::from_millis(config.probe_wait_ms);
        self.probe_timeout = Duration::from_secs(config.probe_timeout_secs);
        self
    }

    /// Probe this URL instead of trusting a settle delay
    pub fn startup_url(mut self, url: impl Into<String>) -> Self {
        self.startup_url = Some(url.into());
        self
    }

    /// Total time allowed for the startup URL to answer
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn probe_wait(mut self, wait: Duration) -> Self {
        self.probe_wait = wait;
        self
    }

    pub fn escalation(mut self, escalation: Escalation) -> Self {
        self.escalation = escalation;
        self
    }

    pub fn build(self) -> Result<WebappServer> {
        let readiness: Box<dyn ReadinessStrategy> = match self.startup_url {
            Some(url) => Box::new(UrlProbe::new(
                url,
                self.probe_wait,
                self.timeout.unwrap_or(self.probe_timeout),
            )?),
            None => Box::new(SettleDelay {
                delay: self.settle_delay,
            }),
        };
        Ok(WebappServer::new(
            self.spec,
            readiness,
            Terminator::new(self.escalation),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webapp::probe::ExitWatch;
    use crate::webapp::proctable::OsProcessTable;
    use crate::webapp::terminate::ProcessTable;

    #[tokio::test]
    async fn test_shutdown_before_startup_is_noop() {
        let mut server = WebappServer::builder(ProcessSpec::new(["true"]))
            .build()
            .unwrap();
        server.shutdown(&CancellationToken::new()).await.unwrap();
        assert!(server.state().is_none());
    }

    /// Readiness that reports an early exit without looking at the process
    struct ReportsEarlyExit;

    #[async_trait::async_trait]
    impl ReadinessStrategy for ReportsEarlyExit {
        async fn wait_ready(
            &self,
            _process: &mut dyn ExitWatch,
            log_file: &Path,
            _cancel: &CancellationToken,
        ) -> Result<()> {
            Err(Error::Startup(StartupFailure::EarlyExit {
                exit_code: Some(1),
                log_file: log_file.to_path_buf(),
            }))
        }

        fn describe(&self) -> String {
            "early exit".to_string()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_sends_no_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = ProcessSpec::new(["sleep", "30"]).log_file(tmp.path().join("webapp.log"));
        let mut server = WebappServer::new(
            spec,
            Box::new(ReportsEarlyExit),
            Terminator::new(Escalation::default()),
        );

        let err = server.startup(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::Startup(StartupFailure::EarlyExit { .. })));
        assert_eq!(server.state(), Some(ProcessState::Failed));

        // the pid was left alone
        let pid = server.pid().unwrap();
        assert!(OsProcessTable::new().is_alive(pid));
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    }

    #[test]
    fn test_builder_picks_strategy() {
        let settle = WebappServer::builder(ProcessSpec::new(["true"]))
            .settle_delay(Duration::from_millis(1500))
            .build()
            .unwrap();
        assert_eq!(settle.readiness.describe(), "settle delay of 1.5s");

        let probe = WebappServer::builder(ProcessSpec::new(["true"]))
            .startup_url("http://127.0.0.1:9877/")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(
            probe.readiness.describe(),
            "GET http://127.0.0.1:9877/ (timeout 5.0s)"
        );
    }
}

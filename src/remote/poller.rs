//! Remote run poller
//!
//! Starts a named test run on the server and polls its result endpoint until
//! the server reports the run as finished. Channel errors abort the run
//! immediately; transient failures are surfaced rather than masked.

use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::common::{Error, Result};

use super::channel::{HttpChannel, Method, ResultChannel};
use super::types::{TestRunHandle, TestRunRequest, TestRunResult};

/// Run-creation endpoint
const START_PATH: &str = "/start_tests/";

/// Worker restart endpoint
const RESTART_PATH: &str = "/restart_workers";

/// Polling behaviour for a run
#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Delay between two status requests
    pub interval: Duration,
    /// Give up with `PollLimit` after this many unfinished polls
    pub max_polls: Option<u64>,
    /// Give up with `RunTimeout` once this much time has passed since start
    pub deadline: Option<Duration>,
}

impl PollOptions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_polls: None,
            deadline: None,
        }
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Client driving test runs on a TestNet server
pub struct RemoteClient<C = HttpChannel> {
    channel: C,
}

impl RemoteClient<HttpChannel> {
    /// Connect to a server with a fresh HTTP session
    pub fn connect(server: &str) -> Self {
        Self::new(HttpChannel::new(server))
    }
}

impl<C: ResultChannel> RemoteClient<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Restart all browser workers, returning how many were restarted
    pub async fn restart_workers(&self) -> Result<u64> {
        let body = self.channel.request(Method::Get, RESTART_PATH, None).await?;
        body.get("workers_restarted")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                Error::Transport(format!("Restart response has no workers_restarted: {}", body))
            })
    }

    /// Start a run without waiting for it
    pub async fn start(&self, request: &TestRunRequest) -> Result<TestRunHandle> {
        let form = request.form_fields();
        let body = self
            .channel
            .request(Method::Post, START_PATH, Some(&form))
            .await?;
        let handle = TestRunHandle::from_response(&body)?;
        tracing::info!(
            run_id = %handle.run_id,
            suite = %request.suite_name,
            browsers = %request.browsers,
            "Test run started"
        );
        Ok(handle)
    }

    /// Fetch the current status of a run
    pub async fn status(&self, handle: &TestRunHandle) -> Result<TestRunResult> {
        let body = self
            .channel
            .request(Method::Get, &handle.result_path(), None)
            .await?;
        serde_json::from_value(body).map_err(|e| {
            Error::Transport(format!(
                "Malformed result for test run {}: {}",
                handle.run_id, e
            ))
        })
    }

    /// Start a run and poll until the server reports it finished
    ///
    /// The returned result always has `finished == true`. Without a poll
    /// limit or deadline this only returns early when `cancel` fires. The
    /// deadline covers the start request as well as every poll.
    pub async fn run(
        &self,
        request: &TestRunRequest,
        options: &PollOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunResult> {
        let started = Instant::now();
        let deadline_at = options.deadline.map(|deadline| started + deadline);

        let handle = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            handle = self.start(request) => handle?,
            _ = sleep_until(deadline_at) => {
                return Err(Error::RunTimeout {
                    run_id: "<not started>".to_string(),
                    elapsed_secs: started.elapsed().as_secs(),
                })
            }
        };
        self.poll_until_finished(&handle, options, started, cancel)
            .await
    }

    /// Poll an already started run until it finishes
    pub async fn wait(
        &self,
        handle: &TestRunHandle,
        options: &PollOptions,
        cancel: &CancellationToken,
    ) -> Result<TestRunResult> {
        self.poll_until_finished(handle, options, Instant::now(), cancel)
            .await
    }

    async fn poll_until_finished(
        &self,
        handle: &TestRunHandle,
        options: &PollOptions,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<TestRunResult> {
        let deadline_at = options.deadline.map(|deadline| started + deadline);
        let timed_out = || Error::RunTimeout {
            run_id: handle.run_id.clone(),
            elapsed_secs: started.elapsed().as_secs(),
        };
        let mut polls: u64 = 0;

        loop {
            // a stalled status request must not outlive the deadline
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                status = self.status(handle) => status?,
                _ = sleep_until(deadline_at) => return Err(timed_out()),
            };
            polls += 1;

            if status.finished {
                tracing::info!(
                    run_id = %handle.run_id,
                    polls,
                    tests = status.results.len(),
                    "Test run finished"
                );
                return Ok(status);
            }

            tracing::debug!(run_id = %handle.run_id, polls, "Test run not finished yet");

            if let Some(max) = options.max_polls {
                if polls >= max {
                    return Err(Error::PollLimit {
                        run_id: handle.run_id.clone(),
                        polls,
                    });
                }
            }

            if deadline_at.is_some_and(|at| Instant::now() >= at) {
                return Err(timed_out());
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep_until(deadline_at) => return Err(timed_out()),
                _ = tokio::time::sleep(options.interval) => {}
            }
        }
    }
}

/// Sleep until `at`, or forever without a deadline
async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

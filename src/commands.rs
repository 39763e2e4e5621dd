//! CLI command definitions
//!
//! Defines the clap commands for the TestNet runner.

use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test suite on a JS TestNet server and report the results
    ///
    /// A webapp to test against can be given after `--`; it is started
    /// before the run and shut down afterwards.
    Run {
        #[command(flatten)]
        remote: RemoteArgs,

        /// Name of test suite to run
        #[arg(long)]
        suite: String,

        /// Comma separated list of browsers to run tests against,
        /// e.g. firefox=~3,firefox=~4,chrome
        #[arg(long)]
        browsers: String,

        /// Security token to start this test suite
        #[arg(long)]
        token: String,

        /// URL of the QUnit test suite (overrides the suite's default)
        #[arg(long)]
        url: Option<String>,

        /// Restart all browser workers before running tests
        #[arg(long)]
        restart: bool,

        /// Milliseconds between two result polls
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        /// Give up after this many result polls
        #[arg(long)]
        max_polls: Option<u64>,

        /// Give up if the run has not finished after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Stop reporting at the first failing test
        #[arg(long)]
        fail_fast: bool,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        webapp: WebappArgs,
    },

    /// Restart all browser workers on the server
    RestartWorkers {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Start a webapp, wait for Ctrl-C, then shut it down
    ///
    /// Useful to check a startup configuration before wiring it into a run.
    Serve {
        #[command(flatten)]
        webapp: WebappArgs,
    },
}

/// Server selection
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// JS TestNet server, e.g. http://jstestnet-server/
    #[arg(long)]
    pub server: Option<String>,
}

/// The webapp under test
#[derive(Args, Debug, Clone, Default)]
pub struct WebappArgs {
    /// Command running the webapp
    #[arg(last = true)]
    pub command: Vec<String>,

    /// Working directory of the webapp
    #[arg(long)]
    pub webapp_cwd: Option<PathBuf>,

    /// Log file for the webapp's output (default: a temp file)
    #[arg(long)]
    pub webapp_log: Option<PathBuf>,

    /// Extra environment for the webapp (KEY=VALUE, repeatable)
    #[arg(long = "env", short = 'e')]
    pub env: Vec<String>,

    /// URL that answers once the webapp is up; without it a fixed
    /// settle delay is used
    #[arg(long)]
    pub startup_url: Option<String>,

    /// Seconds the startup URL may take to answer
    #[arg(long)]
    pub startup_timeout: Option<u64>,

    /// Run `manage.py runserver` from this Django project root
    #[arg(long, conflicts_with = "command")]
    pub django_root: Option<PathBuf>,

    /// Host to bind runserver to; must match the suite's URL
    #[arg(long, default_value = "0.0.0.0")]
    pub django_host: String,

    /// Port to bind runserver to; must match the suite's URL
    #[arg(long, default_value = "9877")]
    pub django_port: u16,

    /// URI checked to see that runserver started
    #[arg(long, default_value = "/")]
    pub django_startup_uri: String,
}

impl WebappArgs {
    /// Whether any webapp was requested
    pub fn is_requested(&self) -> bool {
        !self.command.is_empty() || self.django_root.is_some()
    }

    /// Parse the `KEY=VALUE` environment overrides
    pub fn env_pairs(&self) -> Result<Vec<(String, String)>, String> {
        self.env
            .iter()
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
                _ => Err(format!("Invalid --env '{}', expected KEY=VALUE", pair)),
            })
            .collect()
    }
}

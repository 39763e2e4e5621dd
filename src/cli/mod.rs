//! CLI command handling
//!
//! Wires the webapp supervisor and the remote runner together for each
//! command and prints the results.

mod report;

use std::future::Future;
use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::commands::{Commands, RemoteArgs, WebappArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::remote::{PollOptions, RemoteClient, TestRunRequest, TestRunResult};
use crate::webapp::{DjangoServer, Escalation, ProcessSpec, WebappServer};

pub use report::write_report;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<()> {
    let cancel = cancel_on_ctrl_c();

    match command {
        Commands::Run {
            remote,
            suite,
            browsers,
            token,
            url,
            restart,
            poll_interval_ms,
            max_polls,
            timeout,
            fail_fast,
            json,
            webapp,
        } => {
            let client = RemoteClient::connect(&server_url(&remote, config)?);

            let mut request = TestRunRequest::new(suite, browsers, token);
            if let Some(url) = url {
                request = request.with_url(url);
            }

            let options = PollOptions {
                interval: poll_interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or_else(|| config.server.poll_interval()),
                max_polls: max_polls.or(config.server.max_polls),
                deadline: timeout
                    .map(Duration::from_secs)
                    .or_else(|| config.server.run_timeout()),
            };

            let mut server = build_webapp(&webapp, config)?;
            let run = async {
                if restart {
                    let restarted = client.restart_workers().await?;
                    tracing::debug!("Restarted {} worker(s)", restarted);
                }
                tracing::debug!(
                    suite = %request.suite_name,
                    server = %client.channel().base_url(),
                    browsers = %request.browsers,
                    "Starting test run"
                );
                client.run(&request, &options, &cancel).await
            };
            let result: TestRunResult =
                with_webapp(server.as_mut(), &cancel, run, &mut std::io::stderr()).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            let summary = if json {
                result.summary()
            } else {
                write_report(&mut std::io::stdout().lock(), &result, fail_fast)?
            };

            if summary.success() {
                Ok(())
            } else {
                Err(Error::TestsFailed {
                    failed: summary.failed,
                    total: summary.total(),
                })
            }
        }

        Commands::RestartWorkers { remote } => {
            let client = RemoteClient::connect(&server_url(&remote, config)?);
            let restarted = client.restart_workers().await?;
            println!("Restarted {} worker(s)", restarted);
            Ok(())
        }

        Commands::Serve { webapp } => {
            let mut server = build_webapp(&webapp, config)?.ok_or_else(|| {
                Error::Config("No webapp given: pass a command after -- or --django-root".to_string())
            })?;

            if let Err(e) = server.startup(&cancel).await {
                // a webapp whose cleanup failed is still live
                shutdown_with_warning(&mut server, &mut std::io::stderr()).await;
                return Err(e);
            }
            println!(
                "Webapp running (pid {}), logging to {}. Press Ctrl-C to stop.",
                server.pid().unwrap_or_default(),
                server.log_file().display()
            );

            cancel.cancelled().await;
            server.shutdown(&CancellationToken::new()).await?;
            println!("Webapp stopped");
            Ok(())
        }
    }
}

/// Run `work` between startup and shutdown of the webapp, if there is one
///
/// Shutdown happens whatever the outcome of startup or `work`. A shutdown
/// failure is written to `warnings` and never replaces that outcome.
async fn with_webapp<T>(
    server: Option<&mut WebappServer>,
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T>>,
    warnings: &mut impl Write,
) -> Result<T> {
    let Some(server) = server else {
        return work.await;
    };

    let outcome = match server.startup(cancel).await {
        Ok(()) => work.await,
        Err(e) => Err(e),
    };
    shutdown_with_warning(server, warnings).await;
    outcome
}

/// Shut the webapp down, reporting a failure instead of returning it
async fn shutdown_with_warning(server: &mut WebappServer, warnings: &mut impl Write) {
    // A fresh token: shutdown must run even after a cancelled run
    if let Err(e) = server.shutdown(&CancellationToken::new()).await {
        tracing::warn!(pid = ?server.pid(), error = %e, "Webapp shutdown failed");
        if let Err(io) = writeln!(warnings, "{} {}", "Warning:".yellow().bold(), e) {
            tracing::debug!(error = %io, "Could not print shutdown warning");
        }
    }
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling");
            token.cancel();
        }
    });
    cancel
}

fn server_url(remote: &RemoteArgs, config: &Config) -> Result<String> {
    remote
        .server
        .clone()
        .or_else(|| config.server.url.clone())
        .ok_or_else(|| Error::Config("Missing --server (or [server] url in config)".to_string()))
}

/// Build the webapp described on the command line, if any
fn build_webapp(args: &WebappArgs, config: &Config) -> Result<Option<WebappServer>> {
    if !args.is_requested() {
        return Ok(None);
    }

    let (mut spec, django_url) = match &args.django_root {
        Some(root) => {
            let django = DjangoServer {
                root: root.clone(),
                host: args.django_host.clone(),
                port: args.django_port,
                startup_uri: args.django_startup_uri.clone(),
            };
            (django.process_spec()?, Some(django.startup_url()))
        }
        None => (ProcessSpec::new(args.command.clone()), None),
    };

    if let Some(dir) = &args.webapp_cwd {
        spec = spec.current_dir(dir);
    }
    if let Some(log) = args.webapp_log.clone().or_else(|| config.webapp.log_file.clone()) {
        spec = spec.log_file(log);
    }
    for (key, value) in args.env_pairs().map_err(Error::Config)? {
        spec = spec.env(key, value);
    }

    let mut builder = WebappServer::builder(spec)
        .config(&config.webapp)
        .escalation(Escalation::from(&config.shutdown));
    if let Some(url) = args.startup_url.clone().or(django_url) {
        builder = builder.startup_url(url);
    }
    if let Some(secs) = args.startup_timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    builder.build().map(Some)
}

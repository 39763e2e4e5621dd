//! End-to-end tests of the webapp supervisor with real processes
//!
//! These spawn `sh` and `sleep`, so they only run on Unix.

#![cfg(unix)]

use std::path::PathBuf;
use std::time::Duration;

use jstestnet::webapp::{
    Escalation, OsProcessTable, ProcessSpec, ProcessState, ProcessTable, Terminator, WebappServer,
};
use jstestnet::{Error, StartupFailure};
use tokio_util::sync::CancellationToken;

/// Fast escalation so failing tests do not hang for long
fn quick_escalation() -> Escalation {
    Escalation::Retry {
        attempts: 25,
        interval: Duration::from_millis(100),
    }
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

struct TestContext {
    _dir: tempfile::TempDir,
    log_file: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let log_file = dir.path().join("webapp.log");
        Self {
            _dir: dir,
            log_file,
        }
    }

    fn spec(&self, script: &str) -> ProcessSpec {
        ProcessSpec::new(["sh", "-c", script]).log_file(&self.log_file)
    }
}

#[tokio::test]
async fn early_exit_reports_log_path() {
    let ctx = TestContext::new();
    let mut server = WebappServer::builder(ctx.spec("echo 'port already in use'; exit 3"))
        .settle_delay(Duration::from_millis(300))
        .escalation(quick_escalation())
        .build()
        .unwrap();

    let err = server.startup(&CancellationToken::new()).await.unwrap_err();
    match &err {
        Error::Startup(StartupFailure::EarlyExit {
            exit_code,
            log_file,
        }) => {
            assert_eq!(*exit_code, Some(3));
            assert_eq!(log_file, &ctx.log_file);
        }
        other => panic!("Expected early exit, got {:?}", other),
    }
    assert!(err.to_string().contains(&ctx.log_file.display().to_string()));
    assert_eq!(server.state(), Some(ProcessState::Failed));

    let log = std::fs::read_to_string(&ctx.log_file).unwrap();
    assert!(log.contains("port already in use"));

    // a failed webapp was already torn down
    server.shutdown(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Failed));
}

#[tokio::test]
async fn shutdown_twice_is_noop() {
    let ctx = TestContext::new();
    let mut server = WebappServer::builder(ctx.spec("sleep 30; true"))
        .settle_delay(Duration::from_millis(300))
        .escalation(quick_escalation())
        .build()
        .unwrap();

    server.startup(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Ready));
    let pid = server.pid().unwrap();

    server.shutdown(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Stopped));
    assert!(!OsProcessTable::new().is_alive(pid));

    server.shutdown(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Stopped));
}

#[tokio::test]
async fn shutdown_terminates_whole_tree() {
    let ctx = TestContext::new();
    let mut server = WebappServer::builder(ctx.spec("sh -c 'sleep 30; true'; true"))
        .settle_delay(Duration::from_millis(500))
        .escalation(quick_escalation())
        .build()
        .unwrap();

    server.startup(&CancellationToken::new()).await.unwrap();
    let root = server.pid().unwrap();

    let inspector = Terminator::with_table(OsProcessTable::new(), quick_escalation());
    let tree = inspector.shutdown_order(root).unwrap();
    // grandchild sleep, child sh, root sh
    assert_eq!(tree.len(), 3, "unexpected tree {:?}", tree);
    assert_eq!(*tree.last().unwrap(), root);

    server.shutdown(&CancellationToken::new()).await.unwrap();

    let table = OsProcessTable::new();
    for pid in tree {
        assert!(!table.is_alive(pid), "process {} survived shutdown", pid);
    }
}

#[tokio::test]
async fn startup_url_probe_succeeds() {
    let ctx = TestContext::new();
    let mut http = mockito::Server::new_async().await;
    let _mock = http
        .mock("GET", "/")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let mut server = WebappServer::builder(ctx.spec("sleep 30; true"))
        .startup_url(format!("{}/", http.url()))
        .probe_wait(Duration::from_millis(50))
        .timeout(Duration::from_secs(5))
        .escalation(quick_escalation())
        .build()
        .unwrap();

    server.startup(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Ready));
    server.shutdown(&CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn startup_url_timeout_tears_down_process() {
    let ctx = TestContext::new();
    let url = format!("http://127.0.0.1:{}/", closed_port());
    let mut server = WebappServer::builder(ctx.spec("sleep 30; true"))
        .startup_url(url.clone())
        .probe_wait(Duration::from_millis(100))
        .timeout(Duration::from_secs(1))
        .escalation(quick_escalation())
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let err = server.startup(&CancellationToken::new()).await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_secs(1));

    match err {
        Error::Startup(StartupFailure::ProbeTimeout {
            startup_url,
            log_file,
            last_error,
            ..
        }) => {
            assert_eq!(startup_url, url);
            assert_eq!(log_file, ctx.log_file);
            assert!(last_error.is_some());
        }
        other => panic!("Expected probe timeout, got {:?}", other),
    }

    assert_eq!(server.state(), Some(ProcessState::Failed));
    let pid = server.pid().unwrap();
    assert!(!OsProcessTable::new().is_alive(pid));
}

#[tokio::test]
async fn wait_style_shutdown() {
    let ctx = TestContext::new();
    let mut server = WebappServer::builder(ctx.spec("sleep 30; true"))
        .settle_delay(Duration::from_millis(300))
        .escalation(Escalation::Wait {
            ceiling: Duration::from_secs(10),
        })
        .build()
        .unwrap();

    server.startup(&CancellationToken::new()).await.unwrap();
    server.shutdown(&CancellationToken::new()).await.unwrap();
    assert_eq!(server.state(), Some(ProcessState::Stopped));
}

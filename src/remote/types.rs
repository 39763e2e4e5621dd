//! TestNet run data model
//!
//! Shapes follow the server's JSON responses as-is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{Error, Result};

/// Parameters for starting a test run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRunRequest {
    /// Name of the test suite registered on the server
    pub suite_name: String,
    /// Browser selector list, e.g. `firefox=~3,firefox=~4,chrome`
    pub browsers: String,
    /// Security token for the suite
    pub token: String,
    /// Override of the suite's default QUnit URL
    pub url: Option<String>,
}

impl TestRunRequest {
    pub fn new(
        suite_name: impl Into<String>,
        browsers: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            suite_name: suite_name.into(),
            browsers: browsers.into(),
            token: token.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Form fields for `POST /start_tests/`
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("name", self.suite_name.clone()),
            ("browsers", self.browsers.clone()),
            ("token", self.token.clone()),
        ];
        if let Some(url) = &self.url {
            fields.push(("url", url.clone()));
        }
        fields
    }
}

/// Server-assigned key of a started run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestRunHandle {
    pub run_id: String,
}

impl TestRunHandle {
    /// Extract the run id from a `/start_tests/` response
    ///
    /// The server may send the id as a number or a string.
    pub fn from_response(body: &Value) -> Result<Self> {
        let run_id = match body.get("test_run_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(Error::Transport(format!(
                    "Unexpected test_run_id in start response: {}",
                    other
                )))
            }
            None => {
                return Err(Error::Transport(format!(
                    "Start response has no test_run_id: {}",
                    body
                )))
            }
        };
        Ok(Self { run_id })
    }

    /// Status endpoint for this run
    pub fn result_path(&self) -> String {
        format!("/test/{}/result", self.run_id)
    }
}

/// Status of a run as reported by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunResult {
    pub finished: bool,
    #[serde(default)]
    pub worker_id: i64,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub results: Vec<TestCaseResult>,
}

/// Outcome of one remote test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub module: String,
    pub test: String,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

/// One assertion executed in a browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    pub result: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub browser: String,
    #[serde(default)]
    pub worker_id: i64,
    #[serde(default)]
    pub stacktrace: Option<String>,
}

impl Assertion {
    /// Failure text in the form `<message> on <browser>{worker} <stacktrace>`
    pub fn failure_message(&self) -> String {
        let msg = self
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or("<unknown error>");
        format!(
            "{} on <{}>{{{}}} {}",
            msg,
            self.browser,
            self.worker_id,
            self.stacktrace.as_deref().unwrap_or("")
        )
        .trim_end()
        .to_string()
    }
}

impl TestCaseResult {
    /// First failed assertion; later assertions are not inspected
    pub fn first_failure(&self) -> Option<&Assertion> {
        self.assertions.iter().find(|a| !a.result)
    }

    pub fn passed(&self) -> bool {
        self.first_failure().is_none()
    }

    /// `module: test`
    pub fn description(&self) -> String {
        format!("{}: {}", self.module, self.test)
    }
}

/// Pass/fail counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

impl TestRunResult {
    pub fn summary(&self) -> RunSummary {
        self.results
            .iter()
            .fold(RunSummary::default(), |mut summary, case| {
                if case.passed() {
                    summary.passed += 1;
                } else {
                    summary.failed += 1;
                }
                summary
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assertion(result: bool, message: Option<&str>) -> Assertion {
        Assertion {
            result,
            message: message.map(str::to_string),
            browser: "firefox".to_string(),
            worker_id: 7,
            stacktrace: None,
        }
    }

    #[test]
    fn test_form_fields_skip_missing_url() {
        let req = TestRunRequest::new("zamboni", "firefox=~4,chrome", "secret");
        let fields = req.form_fields();
        assert_eq!(fields.len(), 3);
        assert!(!fields.iter().any(|(k, _)| *k == "url"));

        let req = req.with_url("http://localhost:9877/qunit/");
        assert!(req
            .form_fields()
            .contains(&("url", "http://localhost:9877/qunit/".to_string())));
    }

    #[test]
    fn test_handle_accepts_numeric_and_string_ids() {
        let h = TestRunHandle::from_response(&json!({"test_run_id": 42})).unwrap();
        assert_eq!(h.run_id, "42");
        assert_eq!(h.result_path(), "/test/42/result");

        let h = TestRunHandle::from_response(&json!({"test_run_id": "abc"})).unwrap();
        assert_eq!(h.run_id, "abc");
    }

    #[test]
    fn test_handle_missing_id_is_transport_error() {
        let err = TestRunHandle::from_response(&json!({"ok": true})).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn test_decode_unfinished_status_without_results() {
        let status: TestRunResult = serde_json::from_value(json!({"finished": false})).unwrap();
        assert!(!status.finished);
        assert!(status.results.is_empty());
    }

    #[test]
    fn test_decode_finished_status() {
        let status: TestRunResult = serde_json::from_value(json!({
            "finished": true,
            "worker_id": 7,
            "user_agent": "Mozilla/5.0",
            "results": [{
                "module": "Test Sessions",
                "test": "Test passing",
                "assertions": [{
                    "result": true,
                    "message": "some assertion",
                    "browser": "firefox",
                    "worker_id": 7
                }]
            }]
        }))
        .unwrap();
        assert_eq!(status.worker_id, 7);
        assert_eq!(status.results[0].description(), "Test Sessions: Test passing");
        assert!(status.results[0].passed());
    }

    #[test]
    fn test_first_failure_stops_at_first() {
        let case = TestCaseResult {
            module: "m".to_string(),
            test: "t".to_string(),
            assertions: vec![
                assertion(true, None),
                assertion(false, Some("first")),
                assertion(false, Some("second")),
            ],
        };
        assert_eq!(case.first_failure().unwrap().message.as_deref(), Some("first"));
        assert!(!case.passed());
    }

    #[test]
    fn test_failure_message_format() {
        let mut a = assertion(false, None);
        assert_eq!(a.failure_message(), "<unknown error> on <firefox>{7}");

        a.message = Some("expected 1".to_string());
        a.stacktrace = Some("at foo.js:3".to_string());
        assert_eq!(a.failure_message(), "expected 1 on <firefox>{7} at foo.js:3");
    }

    #[test]
    fn test_summary_counts() {
        let ok = TestCaseResult {
            module: "m".to_string(),
            test: "ok".to_string(),
            assertions: vec![assertion(true, None)],
        };
        let bad = TestCaseResult {
            module: "m".to_string(),
            test: "bad".to_string(),
            assertions: vec![assertion(false, Some("nope"))],
        };
        let run = TestRunResult {
            finished: true,
            worker_id: 1,
            user_agent: String::new(),
            results: vec![ok.clone(), bad, ok],
        };
        let summary = run.summary();
        assert_eq!(summary, RunSummary { passed: 2, failed: 1 });
        assert_eq!(summary.total(), 3);
        assert!(!summary.success());
    }
}

//! Remote control for a JS TestNet server
//!
//! [`channel`] talks HTTP+JSON to the server, [`poller`] drives a test run
//! through it until the server reports the run finished.

pub mod channel;
pub mod poller;
pub mod types;

pub use channel::{HttpChannel, Method, ResultChannel};
pub use poller::{PollOptions, RemoteClient};
pub use types::{Assertion, RunSummary, TestCaseResult, TestRunHandle, TestRunRequest, TestRunResult};

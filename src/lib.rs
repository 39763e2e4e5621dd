//! JS TestNet runner - remote test runs and webapp supervision
//!
//! This library drives test runs on a JS TestNet server until they finish
//! and supervises the local webapp process those tests run against.

pub mod cli;
pub mod commands;
pub mod common;
pub mod remote;
pub mod webapp;

// Re-export commonly used types for tests
pub use common::{Error, Result, StartupFailure};
pub use remote::{PollOptions, RemoteClient, TestRunRequest, TestRunResult};
pub use webapp::{Escalation, ProcessSpec, WebappServer};

//! Supervision of the web application under test
//!
//! The webapp runs as a subprocess whose output goes to a log file. Startup
//! blocks until a readiness strategy says the server is up; shutdown
//! interrupts the whole process tree, children first.

pub mod django;
pub mod probe;
pub mod process;
pub mod proctable;
pub mod server;
pub mod terminate;

pub use django::DjangoServer;
pub use probe::{ExitWatch, HttpProbe, Liveness, Probe, ReadinessStrategy, SettleDelay, UrlProbe};
pub use process::{ProcessHandle, ProcessSpec, ProcessState};
pub use proctable::OsProcessTable;
pub use server::{WebappServer, WebappServerBuilder};
pub use terminate::{Escalation, ProcessTable, Terminator};

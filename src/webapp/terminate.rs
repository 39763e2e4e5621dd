//! Process tree termination
//!
//! Descendants are stopped before their parents so that nothing is orphaned
//! when the root goes away. Processes are interrupted (SIGINT) so they get a
//! chance to clean up; there is no escalation to SIGKILL.

use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::common::config::{ShutdownConfig, ShutdownStyle};
use crate::common::{Error, Result};

use super::proctable::OsProcessTable;

/// Deepest process tree level that is walked
const MAX_TREE_DEPTH: usize = 64;

/// Poll period while waiting for a process to exit after a single signal
const EXIT_POLL: Duration = Duration::from_millis(100);

/// Access to the processes that can be terminated
pub trait ProcessTable: Send + Sync {
    /// Direct children of `pid`, empty if it has none or is gone
    fn children(&self, pid: u32) -> Result<Vec<u32>>;

    /// Send an interrupt signal; a process that is already gone is not an error
    fn interrupt(&self, pid: u32) -> Result<()>;

    /// Whether the process is still running (zombies count as exited)
    fn is_alive(&self, pid: u32) -> bool;
}

/// How hard to try before giving up on a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Interrupt, wait `interval`, check; repeat up to `attempts` times
    Retry { attempts: u32, interval: Duration },
    /// Interrupt once and wait up to `ceiling` for the exit
    Wait { ceiling: Duration },
}

impl Default for Escalation {
    fn default() -> Self {
        Self::Retry {
            attempts: 25,
            interval: Duration::from_millis(500),
        }
    }
}

impl From<&ShutdownConfig> for Escalation {
    fn from(config: &ShutdownConfig) -> Self {
        match config.style {
            ShutdownStyle::Retry => Self::Retry {
                attempts: config.attempts.max(1),
                interval: Duration::from_millis(config.interval_ms),
            },
            ShutdownStyle::Wait => Self::Wait {
                ceiling: Duration::from_secs(config.wait_ceiling_secs),
            },
        }
    }
}

/// Terminates whole process trees
pub struct Terminator<T = OsProcessTable> {
    table: T,
    escalation: Escalation,
    max_depth: usize,
}

impl Terminator<OsProcessTable> {
    pub fn new(escalation: Escalation) -> Self {
        Self::with_table(OsProcessTable::new(), escalation)
    }
}

impl Default for Terminator<OsProcessTable> {
    fn default() -> Self {
        Self::new(Escalation::default())
    }
}

impl<T: ProcessTable> Terminator<T> {
    pub fn with_table(table: T, escalation: Escalation) -> Self {
        Self {
            table,
            escalation,
            max_depth: MAX_TREE_DEPTH,
        }
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn escalation(&self) -> Escalation {
        self.escalation
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Every process of the tree rooted at `root`, children before parents
    ///
    /// Walks with an explicit stack and a visited set, so a cyclic or very
    /// deep parent relation reported by the OS cannot loop forever.
    pub fn shutdown_order(&self, root: u32) -> Result<Vec<u32>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        // (pid, depth, children already pushed)
        let mut stack = vec![(root, 0usize, false)];

        while let Some((pid, depth, expanded)) = stack.pop() {
            if expanded {
                order.push(pid);
                continue;
            }
            if !visited.insert(pid) {
                tracing::warn!(pid, "Process reported twice in tree, skipping");
                continue;
            }
            stack.push((pid, depth, true));

            if depth >= self.max_depth {
                tracing::warn!(pid, depth, "Process tree too deep, not descending further");
                continue;
            }

            let children = match self.table.children(pid) {
                Ok(children) => children,
                Err(e) if pid == root => return Err(e),
                Err(e) => {
                    tracing::debug!(pid, error = %e, "Could not list children");
                    Vec::new()
                }
            };
            // reversed so the lowest pid is handled first
            for child in children.into_iter().rev() {
                if !visited.contains(&child) {
                    stack.push((child, depth + 1, false));
                }
            }
        }

        Ok(order)
    }

    /// Terminate `root` and all of its descendants
    ///
    /// Stops at the first process that survives; nothing above it in the
    /// tree is signalled in that case.
    pub async fn terminate(&self, root: u32, cancel: &CancellationToken) -> Result<()> {
        let order = self.shutdown_order(root)?;
        tracing::debug!(root, ?order, "Terminating process tree");

        for pid in order {
            self.stop_process(pid, cancel).await?;
        }
        Ok(())
    }

    /// Bring down a single process using the configured escalation
    pub async fn stop_process(&self, pid: u32, cancel: &CancellationToken) -> Result<()> {
        if !self.table.is_alive(pid) {
            tracing::trace!(pid, "Process already exited");
            return Ok(());
        }

        match self.escalation {
            Escalation::Retry { attempts, interval } => {
                for attempt in 1..=attempts {
                    tracing::debug!(pid, attempt, "Sending SIGINT");
                    self.table.interrupt(pid)?;
                    pause(interval, cancel).await?;
                    if !self.table.is_alive(pid) {
                        tracing::debug!(pid, attempt, "Process exited");
                        return Ok(());
                    }
                }
                tracing::warn!(pid, attempts, "Process survived all interrupts");
                Err(Error::Termination { pid, attempts })
            }
            Escalation::Wait { ceiling } => {
                tracing::debug!(pid, "Sending SIGINT");
                self.table.interrupt(pid)?;
                let deadline = tokio::time::Instant::now() + ceiling;
                while self.table.is_alive(pid) {
                    let now = tokio::time::Instant::now();
                    if now >= deadline {
                        tracing::warn!(pid, ceiling_secs = ceiling.as_secs_f64(), "Process did not exit");
                        return Err(Error::Termination { pid, attempts: 1 });
                    }
                    pause(EXIT_POLL.min(deadline - now), cancel).await?;
                }
                Ok(())
            }
        }
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

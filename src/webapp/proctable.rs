//! OS process table access
//!
//! Linux reads `/proc` directly; other systems go through `sysinfo`.

use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, System};

use crate::common::{Error, Result};

use super::terminate::ProcessTable;

/// One row of the process table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: u32,
    /// Exited but not yet reaped by its parent
    pub zombie: bool,
}

/// Process table of the running system, signalled with `kill(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessTable;

impl OsProcessTable {
    pub fn new() -> Self {
        Self
    }

    /// Snapshot of every visible process
    pub fn snapshot(&self) -> Result<Vec<ProcessEntry>> {
        if std::path::Path::new("/proc/self/stat").exists() {
            read_proc()
        } else {
            Ok(read_sysinfo(ProcessesToUpdate::All))
        }
    }

    fn entry(&self, pid: u32) -> Option<ProcessEntry> {
        if std::path::Path::new("/proc/self/stat").exists() {
            std::fs::read_to_string(format!("/proc/{}/stat", pid))
                .ok()
                .and_then(|stat| parse_proc_stat(&stat))
        } else {
            read_sysinfo(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]))
                .into_iter()
                .find(|e| e.pid == pid)
        }
    }
}

impl ProcessTable for OsProcessTable {
    fn children(&self, pid: u32) -> Result<Vec<u32>> {
        let mut children: Vec<u32> = self
            .snapshot()?
            .into_iter()
            .filter(|e| e.ppid == pid && e.pid != pid)
            .map(|e| e.pid)
            .collect();
        children.sort_unstable();
        Ok(children)
    }

    #[cfg(unix)]
    fn interrupt(&self, pid: u32) -> Result<()> {
        let pid_t = libc::pid_t::try_from(pid)
            .map_err(|_| Error::Internal(format!("pid {} out of range", pid)))?;
        let rc = unsafe { libc::kill(pid_t, libc::SIGINT) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // already gone
            return Ok(());
        }
        Err(Error::Io(err))
    }

    #[cfg(not(unix))]
    fn interrupt(&self, pid: u32) -> Result<()> {
        Err(Error::Internal(format!(
            "cannot signal process {}: interrupt signals need a Unix platform",
            pid
        )))
    }

    fn is_alive(&self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            let Ok(pid_t) = libc::pid_t::try_from(pid) else {
                return false;
            };
            // Signal 0 tests process existence without side effects
            let rc = unsafe { libc::kill(pid_t, 0) };
            if rc != 0
                && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH)
            {
                return false;
            }
        }
        // Zombies have exited, they are only waiting to be reaped
        match self.entry(pid) {
            Some(entry) => !entry.zombie,
            None => false,
        }
    }
}

/// Parse the contents of `/proc/<pid>/stat`
///
/// The command name is parenthesised and may itself contain spaces or
/// parentheses, so fields are split after the last `)`.
pub fn parse_proc_stat(stat: &str) -> Option<ProcessEntry> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    let pid = stat[..open].trim().parse().ok()?;
    let mut rest = stat[close + 1..].split_whitespace();
    let state = rest.next()?;
    let ppid = rest.next()?.parse().ok()?;
    Some(ProcessEntry {
        pid,
        ppid,
        zombie: state.starts_with('Z'),
    })
}

fn read_proc() -> Result<Vec<ProcessEntry>> {
    let mut entries = Vec::new();
    for dir in std::fs::read_dir("/proc")? {
        let Ok(dir) = dir else { continue };
        let name = dir.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        // Processes may exit between listing and reading
        let Ok(stat) = std::fs::read_to_string(dir.path().join("stat")) else {
            continue;
        };
        if let Some(entry) = parse_proc_stat(&stat) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Process list from `sysinfo`, for systems without `/proc`
fn read_sysinfo(which: ProcessesToUpdate<'_>) -> Vec<ProcessEntry> {
    let mut system = System::new();
    system.refresh_processes_specifics(which, true, ProcessRefreshKind::nothing());
    system
        .processes()
        .iter()
        .map(|(pid, process)| ProcessEntry {
            pid: pid.as_u32(),
            ppid: process.parent().map(Pid::as_u32).unwrap_or(0),
            zombie: process.status() == ProcessStatus::Zombie,
        })
        .collect()
}

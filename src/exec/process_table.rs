// src/exec/process_table.rs

//! Thin view over the OS process table.
//!
//! On Linux this reads `/proc/<pid>/stat`. Elsewhere on unix only signal-0
//! probes are available, so descendant discovery degrades to "none".

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::trace;

/// One row of the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: i32,
    pub ppid: i32,
    pub pgrp: i32,
    pub state: char,
}

impl ProcEntry {
    /// Zombies and dead entries do not count as running.
    pub fn is_running(&self) -> bool {
        !matches!(self.state, 'Z' | 'X' | 'x')
    }
}

/// Parse the content of a `/proc/<pid>/stat` file.
///
/// The command name is wrapped in parentheses and may itself contain spaces
/// or parentheses, so fields are read after the *last* `)`.
pub fn parse_stat(content: &str) -> Option<ProcEntry> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let pid = content[..open].trim().parse().ok()?;
    let mut rest = content.get(close + 1..)?.split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid = rest.next()?.parse().ok()?;
    let pgrp = rest.next()?.parse().ok()?;
    Some(ProcEntry {
        pid,
        ppid,
        pgrp,
        state,
    })
}

#[cfg(target_os = "linux")]
pub fn entry(pid: i32) -> Option<ProcEntry> {
    let content = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    parse_stat(&content)
}

#[cfg(target_os = "linux")]
pub fn snapshot() -> Vec<ProcEntry> {
    let Ok(dir) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    dir.filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str()?.parse::<i32>().ok())
        .filter_map(entry)
        .collect()
}

#[cfg(not(target_os = "linux"))]
pub fn snapshot() -> Vec<ProcEntry> {
    Vec::new()
}

/// Whether `pid` is present and not a zombie.
pub fn is_running(pid: i32) -> bool {
    #[cfg(target_os = "linux")]
    {
        entry(pid).is_some_and(|e| e.is_running())
    }
    #[cfg(not(target_os = "linux"))]
    {
        signal::kill(Pid::from_raw(pid), None).is_ok()
    }
}

/// Whether any running process still belongs to process group `pgid`.
pub fn group_is_running(pgid: i32) -> bool {
    #[cfg(target_os = "linux")]
    {
        snapshot()
            .iter()
            .any(|e| e.pgrp == pgid && e.is_running())
    }
    #[cfg(not(target_os = "linux"))]
    {
        signal::killpg(Pid::from_raw(pgid), None).is_ok()
    }
}

/// All descendants of `root` in `table`, deepest first.
pub fn descendants_in(table: &[ProcEntry], root: i32) -> Vec<i32> {
    let mut levels: Vec<Vec<i32>> = Vec::new();
    let mut frontier = vec![root];

    while !frontier.is_empty() {
        let next: Vec<i32> = table
            .iter()
            .filter(|e| frontier.contains(&e.ppid) && e.pid != root)
            .map(|e| e.pid)
            .collect();
        if next.is_empty() {
            break;
        }
        levels.push(next.clone());
        frontier = next;
    }

    levels.into_iter().rev().flatten().collect()
}

/// Descendants of `root` in the live process table, deepest first.
pub fn descendants(root: i32) -> Vec<i32> {
    descendants_in(&snapshot(), root)
}

/// Send `sig` to a single pid, ignoring processes that are already gone.
pub fn signal_pid(pid: i32, sig: Signal) {
    match signal::kill(Pid::from_raw(pid), sig) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => trace!(pid, signal = ?sig, error = %e, "signal failed"),
    }
}

/// Send `sig` to a whole process group.
pub fn signal_group(pgid: i32, sig: Signal) {
    match signal::killpg(Pid::from_raw(pgid), sig) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => trace!(pgid, signal = ?sig, error = %e, "group signal failed"),
    }
}

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

pub use packrun_test_utils::{collecting_sink, eventually, init_tracing, with_timeout, write_file};

/// One machine-readable output line as the tool prints it.
pub fn tool_line(target: &str, kind: &str, data: &[&str]) -> String {
    let mut line = format!("1700000000,{target},{kind}");
    for part in data {
        line.push(',');
        line.push_str(part);
    }
    line
}

/// Wait for a script to publish its pid into `path`.
pub async fn read_pid(path: &Path) -> i32 {
    let mut pid = None;
    let found = eventually(Duration::from_secs(5), || {
        pid = std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse::<i32>().ok());
        pid.is_some()
    })
    .await;
    assert!(found, "no pid written to {}", path.display());
    pid.unwrap()
}

/// Whether `pid` is still a live (non-zombie) process.
pub fn pid_alive(pid: i32) -> bool {
    packrun::exec::process_table::is_running(pid)
}

// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the build tool, using
//! `tokio::process::Command`, and turning its stdout into [`Message`]s.
//!
//! - [`launcher`] defines the `ProcessLauncher` / `ProcessHandle` traits, the
//!   always-compatible `DefaultProcessLauncher` and launcher selection.
//! - [`posix`] provides the tree-aware `PosixProcessLauncher`.
//! - [`process_table`] reads the OS process table for liveness and descendant
//!   discovery (unix only).
//! - [`output_reader`] drains stdout on a background task.
//! - [`execution`] couples one launched process with its reader.
//!
//! [`Message`]: crate::message::Message

pub mod execution;
pub mod launcher;
pub mod output_reader;
pub mod posix;
#[cfg(unix)]
pub mod process_table;

pub use execution::{Execution, ExecutionOptions};
pub use launcher::{
    default_launchers, select_launcher, DefaultProcessLauncher, ProcessHandle,
    ProcessLauncher, ToolCommand,
};
pub use output_reader::OutputReader;
pub use posix::PosixProcessLauncher;

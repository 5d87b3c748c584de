// src/command/mod.rs

//! Command contract driven by [`crate::task::CommandTask`].
//!
//! A [`Command`] supplies what to run (name, arguments, working directory)
//! and hooks into the task life cycle:
//!
//! ```text
//! init ──false──> Ignored
//!   │
//!  true
//!   ▼
//! launch ─> wait ──0──> on_success ─> Success
//!             │
//!             ├─≠0─> map_failure_code ─> on_failure ─> Failure(code)
//!             │
//!             └─timeout / interrupt─> on_abort
//! ```

pub mod build;
pub mod checksum;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::deadline::Deadline;
use crate::errors::{CommandFailure, PackrunError, Result};

pub use build::{BuildCommand, BuildOptions};

/// Failure taxonomy for non-zero exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FailureCode {
    /// Generic failure of the build tool.
    Error,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::Error => f.write_str("FAILURE_ERROR"),
        }
    }
}

/// A unit of work executed by a command task.
///
/// `init` performs blocking work and is run off the async runtime; the other
/// hooks are expected to be quick.
pub trait Command: Send + Sync {
    /// Tool sub-command, e.g. `build`.
    fn name(&self) -> &str;

    fn arguments(&self) -> &[String];

    /// `None` means "the current directory of the caller".
    fn working_dir(&self) -> Option<&Path>;

    /// Prepare the run. Returning `false` skips execution (`Ignored`).
    fn init(&self, deadline: Deadline) -> Result<bool>;

    fn on_success(&self) {}

    fn on_failure(&self, code: FailureCode);

    /// Called when the run is timed out, interrupted or torn down.
    fn on_abort(&self);

    fn map_failure_code(&self, exit_code: i32) -> FailureCode;
}

/// Outcome of a completed command task.
#[derive(Debug, Clone)]
pub enum CommandResult {
    Success,
    /// `init` vetoed the run.
    Ignored,
    Failure(FailureCode),
    /// `init` failed.
    Error(Arc<PackrunError>),
}

impl CommandResult {
    /// `Ok(true)` on success, `Ok(false)` when ignored.
    ///
    /// Failures and command errors are returned as `Err`.
    pub fn success(&self) -> std::result::Result<bool, CommandFailure> {
        match self {
            CommandResult::Success => Ok(true),
            CommandResult::Ignored => Ok(false),
            CommandResult::Failure(code) => Err(CommandFailure::Failed(*code)),
            CommandResult::Error(err) => Err(CommandFailure::Error(Arc::clone(err))),
        }
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, CommandResult::Ignored)
    }
}

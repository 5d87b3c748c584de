// src/errors.rs

//! Crate-wide error types and helpers.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::command::FailureCode;

#[derive(Error, Debug)]
pub enum PackrunError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {context}: {source}")]
    IoFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out")]
    TimedOut,

    #[error("Cancelled")]
    Cancelled,

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PackrunError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PackrunError::IoFailure {
            context: context.into(),
            source,
        }
    }

    /// Same as [`PackrunError::io`], naming the path involved.
    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        PackrunError::IoFailure {
            context: format!("{action} {}", path.display()),
            source,
        }
    }
}

impl From<std::io::Error> for PackrunError {
    fn from(e: std::io::Error) -> Self {
        PackrunError::io("io", e)
    }
}

/// Why a command task did not produce a [`crate::command::CommandResult`].
///
/// Cached outcomes are handed to every caller of `get`, hence `Clone`.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("command task timed out")]
    TimedOut,

    #[error("command task was cancelled")]
    Cancelled,

    #[error("command task already started")]
    AlreadyStarted,

    #[error("command task execution failed: {0}")]
    Execution(Arc<PackrunError>),
}

impl From<PackrunError> for TaskError {
    fn from(e: PackrunError) -> Self {
        match e {
            PackrunError::TimedOut => TaskError::TimedOut,
            PackrunError::Cancelled => TaskError::Cancelled,
            other => TaskError::Execution(Arc::new(other)),
        }
    }
}

/// Raised by [`crate::command::CommandResult::success`] for unsuccessful
/// outcomes.
#[derive(Error, Debug, Clone)]
pub enum CommandFailure {
    #[error("build tool execution failed: {0}")]
    Failed(FailureCode),

    #[error("command error: {0}")]
    Error(Arc<PackrunError>),
}

pub type Result<T> = std::result::Result<T, PackrunError>;

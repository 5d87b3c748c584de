// src/exec/launcher.rs

//! Pluggable process launch strategies.
//!
//! A [`ProcessLauncher`] starts the build tool and returns a
//! [`ProcessHandle`]. Several strategies can be registered; the first one whose
//! [`ProcessLauncher::compatible`] returns true is used.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use crate::errors::{PackrunError, Result};
use crate::exec::posix::PosixProcessLauncher;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Program (plus leading flags) every invocation starts with.
///
/// The final argv is `<program> <flags...> <command-name> <command-args...>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub flags: Vec<String>,
}

pub const DEFAULT_TOOL_PROGRAM: &str = "packer";
pub const MACHINE_READABLE_FLAG: &str = "-machine-readable";

impl ToolCommand {
    pub fn new<P, I, S>(program: P, flags: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    /// Full argv for one invocation, program first.
    pub fn argv(&self, name: &str, args: &[String]) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.flags.iter().cloned())
            .chain(std::iter::once(name.to_string()))
            .chain(args.iter().cloned())
            .collect()
    }
}

impl Default for ToolCommand {
    fn default() -> Self {
        ToolCommand::new(DEFAULT_TOOL_PROGRAM, [MACHINE_READABLE_FLAG])
    }
}

/// Handle over a launched tool process.
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Take the stdout pipe. Returns `None` on the second call.
    fn take_stdout(&mut self) -> Option<ChildStdout>;

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitStatus>>;

    /// Whether the process (or anything it is responsible for) still runs.
    fn is_alive(&mut self) -> bool;

    /// Terminate the process. Idempotent.
    fn destroy(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Strategy able to launch the build tool.
pub trait ProcessLauncher: Send + Sync {
    fn name(&self) -> &'static str;

    fn compatible(&self) -> bool;

    fn launch(
        &self,
        tool: &ToolCommand,
        working_dir: &Path,
        name: &str,
        args: &[String],
    ) -> Result<Box<dyn ProcessHandle>>;
}

/// Launchers in priority order: tree-aware POSIX first, plain fallback last.
pub fn default_launchers() -> Vec<Arc<dyn ProcessLauncher>> {
    vec![
        Arc::new(PosixProcessLauncher::default()),
        Arc::new(DefaultProcessLauncher),
    ]
}

/// Pick the first compatible launcher.
pub fn select_launcher(
    launchers: &[Arc<dyn ProcessLauncher>],
) -> Result<Arc<dyn ProcessLauncher>> {
    launchers
        .iter()
        .find(|l| l.compatible())
        .cloned()
        .ok_or_else(|| {
            PackrunError::ConfigError("no compatible process launcher".to_string())
        })
}

/// Build the tokio command shared by every strategy.
///
/// Stdout is piped for the output reader; stderr is piped and drained once
/// the child is spawned (see [`drain_stderr`]).
pub(crate) fn tool_command(
    tool: &ToolCommand,
    working_dir: &Path,
    name: &str,
    args: &[String],
) -> Command {
    let mut cmd = Command::new(&tool.program);
    cmd.args(&tool.flags)
        .arg(name)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Spawn `cmd`, wrapping spawn failures with the argv for context.
pub(crate) fn spawn_tool(
    mut cmd: Command,
    tool: &ToolCommand,
    name: &str,
    args: &[String],
) -> Result<Child> {
    let mut child = cmd.spawn().map_err(|e| {
        PackrunError::io(
            format!("spawning {:?}", tool.argv(name, args).join(" ")),
            e,
        )
    })?;
    drain_stderr(&mut child);
    Ok(child)
}

/// Always consume stderr so buffers don't fill; log at debug.
fn drain_stderr(child: &mut Child) {
    let Some(stderr) = child.stderr.take() else {
        return;
    };
    let pid = child.id();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(?pid, "stderr: {}", line);
        }
    });
}

/// Fallback strategy: always compatible, no tree awareness.
///
/// Liveness is the handle's own state and `destroy` only reaches the
/// immediate child.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProcessLauncher;

impl ProcessLauncher for DefaultProcessLauncher {
    fn name(&self) -> &'static str {
        "default"
    }

    fn compatible(&self) -> bool {
        true
    }

    fn launch(
        &self,
        tool: &ToolCommand,
        working_dir: &Path,
        name: &str,
        args: &[String],
    ) -> Result<Box<dyn ProcessHandle>> {
        let cmd = tool_command(tool, working_dir, name, args);
        let child = spawn_tool(cmd, tool, name, args)?;
        debug!(pid = ?child.id(), launcher = self.name(), "tool process started");
        Ok(Box::new(DefaultProcess { child }))
    }
}

pub struct DefaultProcess {
    child: Child,
}

impl ProcessHandle for DefaultProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitStatus>> {
        Box::pin(self.child.wait())
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn destroy(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if self.child.try_wait()?.is_none() {
                self.child.kill().await?;
            }
            Ok(())
        })
    }
}

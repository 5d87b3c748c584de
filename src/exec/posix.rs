// src/exec/posix.rs

//! Tree-aware launch strategy for POSIX systems.
//!
//! The build tool commonly forks plugin processes that keep running after the
//! immediate child is gone, so neither the child handle's liveness nor a plain
//! kill of the child are trustworthy. The tool is started as the leader of a
//! fresh process group; liveness and destruction are then resolved against the
//! OS process table (the leader, its group, and its descendant tree).

use std::path::Path;
use std::time::Duration;

use crate::errors::Result;
use crate::exec::launcher::{ProcessHandle, ProcessLauncher, ToolCommand};

/// How long `destroy` waits after `SIGTERM` before escalating to `SIGKILL`.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct PosixProcessLauncher {
    kill_grace: Duration,
}

impl PosixProcessLauncher {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }
}

impl Default for PosixProcessLauncher {
    fn default() -> Self {
        PosixProcessLauncher::new(DEFAULT_KILL_GRACE)
    }
}

impl ProcessLauncher for PosixProcessLauncher {
    fn name(&self) -> &'static str {
        "posix"
    }

    fn compatible(&self) -> bool {
        cfg!(unix)
    }

    #[cfg(unix)]
    fn launch(
        &self,
        tool: &ToolCommand,
        working_dir: &Path,
        name: &str,
        args: &[String],
    ) -> Result<Box<dyn ProcessHandle>> {
        use crate::errors::PackrunError;
        use crate::exec::launcher::{spawn_tool, tool_command};

        let mut cmd = tool_command(tool, working_dir, name, args);
        cmd.process_group(0);
        let child = spawn_tool(cmd, tool, name, args)?;
        let pid = child.id().ok_or_else(|| {
            PackrunError::ConfigError("tool process exited before its pid was known".into())
        })? as i32;

        tracing::debug!(pid, launcher = self.name(), "tool process started in its own group");
        Ok(Box::new(unix::PosixProcess::new(child, pid, self.kill_grace)))
    }

    #[cfg(not(unix))]
    fn launch(
        &self,
        _tool: &ToolCommand,
        _working_dir: &Path,
        _name: &str,
        _args: &[String],
    ) -> Result<Box<dyn ProcessHandle>> {
        Err(crate::errors::PackrunError::ConfigError(
            "posix launcher used on a non-unix platform".to_string(),
        ))
    }
}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::process::ExitStatus;
    use std::time::Duration;

    use nix::sys::signal::Signal;
    use tokio::process::{Child, ChildStdout};
    use tokio::time::{sleep, Instant};
    use tracing::{debug, warn};

    use crate::exec::launcher::{BoxFuture, ProcessHandle};
    use crate::exec::process_table;

    const POLL_INTERVAL: Duration = Duration::from_millis(20);

    pub struct PosixProcess {
        child: Child,
        pid: i32,
        kill_grace: Duration,
        /// Descendants seen at destroy time; they may have left the group.
        tracked: Vec<i32>,
    }

    impl PosixProcess {
        pub fn new(child: Child, pid: i32, kill_grace: Duration) -> Self {
            Self {
                child,
                pid,
                kill_grace,
                tracked: Vec::new(),
            }
        }

        fn signal_tree(&self, sig: Signal) {
            for pid in &self.tracked {
                process_table::signal_pid(*pid, sig);
            }
            process_table::signal_group(self.pid, sig);
        }

        async fn settle(&mut self, within: Duration) -> bool {
            let until = Instant::now() + within;
            while self.is_alive() {
                if Instant::now() >= until {
                    return false;
                }
                sleep(POLL_INTERVAL).await;
            }
            true
        }
    }

    impl Drop for PosixProcess {
        fn drop(&mut self) {
            if matches!(self.child.try_wait(), Ok(None)) {
                self.signal_tree(Signal::SIGKILL);
            }
        }
    }

    impl ProcessHandle for PosixProcess {
        fn id(&self) -> Option<u32> {
            Some(self.pid as u32)
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
            // Reap the leader first so it never shows up as a zombie.
            if matches!(self.child.try_wait(), Ok(None)) {
                return true;
            }
            process_table::group_is_running(self.pid)
                || self.tracked.iter().any(|pid| process_table::is_running(*pid))
        }

        fn destroy(&mut self) -> BoxFuture<'_, io::Result<()>> {
            Box::pin(async move {
                for pid in process_table::descendants(self.pid) {
                    if !self.tracked.contains(&pid) {
                        self.tracked.push(pid);
                    }
                }
                debug!(pid = self.pid, descendants = ?self.tracked, "terminating process tree");

                self.signal_tree(Signal::SIGTERM);
                if self.child.try_wait()?.is_none() {
                    // SIGKILL + reap for the leader itself.
                    self.child.kill().await?;
                }

                if self.settle(self.kill_grace).await {
                    return Ok(());
                }

                warn!(pid = self.pid, "process tree survived SIGTERM; sending SIGKILL");
                self.signal_tree(Signal::SIGKILL);
                if !self.settle(self.kill_grace).await {
                    warn!(pid = self.pid, "process tree still alive after SIGKILL");
                }
                Ok(())
            })
        }
    }
}

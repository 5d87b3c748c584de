// src/exec/execution.rs

//! One running instance of the build tool plus its output reader.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deadline::Deadline;
use crate::errors::{PackrunError, Result};
use crate::exec::launcher::{select_launcher, ProcessHandle, ProcessLauncher, ToolCommand};
use crate::exec::output_reader::OutputReader;
use crate::message::MessageSink;

/// Tunables of a single execution.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    /// Upper bound for draining the output reader once the process is gone.
    pub drain_timeout: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Couples a launched process with its [`OutputReader`].
///
/// The process handle sits behind an async mutex so that `error_code` (which
/// waits on it) and `interrupt` (which kills it) can be driven from different
/// tasks. `interrupt` first cancels `interrupted`, which makes a pending
/// `error_code` let go of the handle.
pub struct Execution {
    process: Mutex<Box<dyn ProcessHandle>>,
    reader: OutputReader,
    interrupted: CancellationToken,
    pid: Option<u32>,
    options: ExecutionOptions,
}

impl Execution {
    /// Select a compatible launcher, start the tool and attach a reader to
    /// its stdout.
    pub fn start(
        launchers: &[Arc<dyn ProcessLauncher>],
        tool: &ToolCommand,
        sink: MessageSink,
        working_dir: &Path,
        name: &str,
        args: &[String],
        options: ExecutionOptions,
    ) -> Result<Execution> {
        let launcher = select_launcher(launchers)?;
        let mut process = launcher.launch(tool, working_dir, name, args)?;

        let stdout = process.take_stdout().ok_or_else(|| {
            PackrunError::ConfigError("launched process has no stdout pipe".to_string())
        })?;
        let reader = OutputReader::spawn(stdout, sink);
        let pid = process.id();

        info!(
            ?pid,
            launcher = launcher.name(),
            dir = %working_dir.display(),
            "execution started"
        );

        Ok(Execution {
            process: Mutex::new(process),
            reader,
            interrupted: CancellationToken::new(),
            pid,
            options,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Wait for the exit code, honoring `deadline`.
    ///
    /// Every path drains the output reader before returning, so the sink has
    /// seen the last message by the time the caller sees completion.
    pub async fn error_code(&self, deadline: Deadline) -> Result<i32> {
        let Ok(deadline) = deadline.checked() else {
            let mut process = self.process.lock().await;
            warn!(pid = ?self.pid, "deadline already expired; destroying tool process");
            destroy_logged(&mut **process).await;
            drop(process);
            self.drain().await;
            return Err(PackrunError::TimedOut);
        };
        let mut process = self.process.lock().await;

        let waited = tokio::select! {
            biased;
            _ = self.interrupted.cancelled() => None,
            status = wait_bounded(&mut **process, deadline) => Some(status),
        };

        match waited {
            Some(Ok(Some(status))) => {
                drop(process);
                self.drain().await;
                let code = exit_code(status);
                debug!(pid = ?self.pid, exit_code = code, "tool process exited");
                Ok(code)
            }
            Some(Ok(None)) => {
                warn!(pid = ?self.pid, "deadline reached; destroying tool process");
                destroy_logged(&mut **process).await;
                drop(process);
                self.drain().await;
                Err(PackrunError::TimedOut)
            }
            Some(Err(e)) => {
                destroy_logged(&mut **process).await;
                drop(process);
                self.drain().await;
                Err(PackrunError::io("waiting for tool process", e))
            }
            None => {
                drop(process);
                // `interrupt` owns the destruction; wait for it to finish.
                let _ = self.process.lock().await;
                self.drain().await;
                Err(PackrunError::Cancelled)
            }
        }
    }

    /// Forcibly stop the process (tree-aware when the launcher supports it).
    ///
    /// Returns whether the process is confirmed dead afterwards.
    pub async fn interrupt(&self) -> bool {
        self.interrupted.cancel();
        let mut process = self.process.lock().await;
        info!(pid = ?self.pid, "interrupting tool process");
        destroy_logged(&mut **process).await;
        let alive = process.is_alive();
        drop(process);
        self.drain().await;
        !alive
    }

    pub async fn is_alive(&self) -> bool {
        self.process.lock().await.is_alive()
    }

    async fn drain(&self) {
        self.reader
            .await_termination_within(self.options.drain_timeout)
            .await;
    }
}

/// `Ok(None)` means the deadline elapsed first.
async fn wait_bounded(
    process: &mut dyn ProcessHandle,
    deadline: Deadline,
) -> std::io::Result<Option<ExitStatus>> {
    if !deadline.is_relevant() {
        return process.wait().await.map(Some);
    }
    match tokio::time::timeout(deadline.remaining(), process.wait()).await {
        Ok(status) => status.map(Some),
        Err(_elapsed) => Ok(None),
    }
}

async fn destroy_logged(process: &mut dyn ProcessHandle) {
    if let Err(e) = process.destroy().await {
        warn!(pid = ?process.id(), error = %e, "failed to destroy tool process");
    }
}

/// Processes terminated by a signal report `-1`.
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

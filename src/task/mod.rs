// src/task/mod.rs

//! Future-like driver of one [`Command`].
//!
//! A [`CommandTask`] runs its command at most once:
//!
//! - `init` on the blocking pool (file I/O, checksum work),
//! - launch of the build tool through the first compatible launcher,
//! - wait for the exit code under the caller's deadline,
//! - the matching life-cycle hook, then the cached [`Outcome`].
//!
//! The first caller of `run`/`get`/`get_timeout` does the work while holding
//! the write half of the result slot; everybody else reads the cached outcome.

mod abort;

pub use abort::AbortGuard;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::command::{Command, CommandResult, FailureCode};
use crate::deadline::Deadline;
use crate::errors::{PackrunError, TaskError};
use crate::exec::{default_launchers, Execution, ExecutionOptions, ProcessLauncher, ToolCommand};
use crate::message::{log_sink, MessageSink};

/// What every caller of a finished task gets back.
pub type Outcome = std::result::Result<CommandResult, TaskError>;

/// Observable phase of a [`CommandTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    Running,
    Succeeded,
    Ignored,
    Failed(FailureCode),
    Errored,
    TimedOut,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::NotStarted | TaskState::Running)
    }

    fn of(outcome: &Outcome) -> TaskState {
        match outcome {
            Ok(CommandResult::Success) => TaskState::Succeeded,
            Ok(CommandResult::Ignored) => TaskState::Ignored,
            Ok(CommandResult::Failure(code)) => TaskState::Failed(*code),
            Ok(CommandResult::Error(_)) => TaskState::Errored,
            Err(TaskError::TimedOut) => TaskState::TimedOut,
            Err(TaskError::Cancelled) => TaskState::Cancelled,
            Err(TaskError::AlreadyStarted) | Err(TaskError::Execution(_)) => TaskState::Errored,
        }
    }
}

pub struct CommandTask {
    command: Arc<dyn Command>,
    launchers: Vec<Arc<dyn ProcessLauncher>>,
    tool: ToolCommand,
    sink: MessageSink,
    shutdown: CancellationToken,
    options: ExecutionOptions,

    started: AtomicBool,
    cancelled: AtomicBool,
    /// Fired by `cancel(true)`; stops a run that has no execution yet.
    interrupt: CancellationToken,
    state: Mutex<TaskState>,
    slot: RwLock<Option<Outcome>>,
    current: Mutex<Option<Arc<Execution>>>,
}

impl CommandTask {
    pub fn new(command: Arc<dyn Command>) -> Self {
        Self {
            command,
            launchers: default_launchers(),
            tool: ToolCommand::default(),
            sink: log_sink(),
            shutdown: CancellationToken::new(),
            options: ExecutionOptions::default(),
            started: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            interrupt: CancellationToken::new(),
            state: Mutex::new(TaskState::NotStarted),
            slot: RwLock::new(None),
            current: Mutex::new(None),
        }
    }

    /// Launch strategies, in priority order.
    pub fn with_launchers(mut self, launchers: Vec<Arc<dyn ProcessLauncher>>) -> Self {
        self.launchers = launchers;
        self
    }

    pub fn with_tool(mut self, tool: ToolCommand) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_sink(mut self, sink: MessageSink) -> Self {
        self.sink = sink;
        self
    }

    /// Token owned by the embedding program (e.g. cancelled on Ctrl-C).
    ///
    /// When it fires mid-run the tool is interrupted, `on_abort` runs and the
    /// outcome is [`TaskError::Cancelled`].
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_execution_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Start the work with no time limit.
    ///
    /// Unlike [`CommandTask::get`], a second call fails with
    /// [`TaskError::AlreadyStarted`] instead of returning the cached outcome.
    pub async fn run(&self) -> Outcome {
        self.complete(Deadline::irrelevant(), true).await
    }

    /// The outcome, doing the work first if nobody has.
    pub async fn get(&self) -> Outcome {
        self.complete(Deadline::irrelevant(), false).await
    }

    /// Like [`CommandTask::get`], bounded by `timeout`.
    ///
    /// The same budget covers `init`, the tool run and waiting for another
    /// caller that is already doing the work.
    pub async fn get_timeout(&self, timeout: Duration) -> Outcome {
        self.complete(Deadline::relevant(timeout), false).await
    }

    /// Cancel the task.
    ///
    /// Before the task starts this only marks it cancelled; later starts fail
    /// with [`TaskError::Cancelled`]. While running, nothing happens unless
    /// `may_interrupt` is set, in which case the tool process is destroyed and
    /// the return value reports whether it is confirmed dead. A finished task
    /// cannot be cancelled.
    pub async fn cancel(&self, may_interrupt: bool) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }

        match self.state() {
            TaskState::NotStarted => {
                self.cancelled.store(true, Ordering::SeqCst);
                debug!(name = self.command.name(), "command task cancelled before start");
                true
            }
            TaskState::Running if may_interrupt => {
                self.cancelled.store(true, Ordering::SeqCst);
                self.interrupt.cancel();
                match self.current_execution() {
                    Some(execution) => execution.interrupt().await,
                    None => true,
                }
            }
            _ => false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TaskState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pid of the running tool process, if any.
    pub fn execution_id(&self) -> Option<u32> {
        self.current_execution().and_then(|e| e.id())
    }

    async fn complete(&self, deadline: Deadline, exclusive: bool) -> Outcome {
        if self.is_done() {
            if let Some(outcome) = self.slot.read().await.as_ref() {
                return cached(outcome, exclusive);
            }
        }

        let Some(mut slot) = within(deadline, self.slot.write()).await else {
            return Err(TaskError::TimedOut);
        };
        if let Some(outcome) = slot.as_ref() {
            return cached(outcome, exclusive);
        }

        let outcome = if self.started.swap(true, Ordering::SeqCst) {
            // An earlier worker was dropped before it could store anything.
            Err(TaskError::Cancelled)
        } else if self.cancelled.load(Ordering::SeqCst) {
            Err(TaskError::Cancelled)
        } else {
            self.set_state(TaskState::Running);
            let span = info_span!("command", name = %self.command.name());
            self.lifecycle(deadline).instrument(span).await
        };

        self.set_state(TaskState::of(&outcome));
        *slot = Some(outcome.clone());
        outcome
    }

    async fn lifecycle(&self, deadline: Deadline) -> Outcome {
        let mut guard = AbortGuard::arm(Arc::clone(&self.command));
        let outcome = self.drive(deadline, &mut guard).await;
        guard.disarm();

        match &outcome {
            Ok(result) => info!(?result, "command finished"),
            Err(e) => warn!(error = %e, "command did not finish"),
        }
        outcome
    }

    async fn drive(&self, deadline: Deadline, guard: &mut AbortGuard) -> Outcome {
        let command = Arc::clone(&self.command);
        let init = tokio::task::spawn_blocking(move || command.init(deadline))
            .await
            .unwrap_or_else(|e| Err(PackrunError::Other(anyhow::anyhow!("init panicked: {e}"))));

        match init {
            Ok(true) => {}
            Ok(false) => return Ok(CommandResult::Ignored),
            Err(PackrunError::TimedOut) => {
                guard.fire();
                return Err(TaskError::TimedOut);
            }
            Err(e) => {
                warn!(error = %e, "command init failed");
                return Ok(CommandResult::Error(Arc::new(e)));
            }
        }

        if self.stop_requested() {
            self.cancelled.store(true, Ordering::SeqCst);
            guard.fire();
            return Err(TaskError::Cancelled);
        }
        let Ok(deadline) = deadline.checked() else {
            guard.fire();
            return Err(TaskError::TimedOut);
        };

        let execution = match self.start_execution() {
            Ok(execution) => Arc::new(execution),
            Err(e) => {
                guard.fire();
                return Err(TaskError::Execution(Arc::new(e)));
            }
        };
        let registered = Registered::new(&self.current, Arc::clone(&execution));

        let waited = tokio::select! {
            code = execution.error_code(deadline) => Some(code),
            _ = self.interrupt.cancelled() => None,
            _ = self.shutdown.cancelled() => None,
        };
        let waited = match waited {
            Some(code) => code,
            None => {
                execution.interrupt().await;
                Err(PackrunError::Cancelled)
            }
        };
        drop(registered);

        match waited {
            Ok(0) => {
                self.command.on_success();
                Ok(CommandResult::Success)
            }
            Ok(exit_code) => {
                let code = self.command.map_failure_code(exit_code);
                info!(exit_code, failure = %code, "build tool failed");
                self.command.on_failure(code);
                Ok(CommandResult::Failure(code))
            }
            Err(PackrunError::TimedOut) => {
                guard.fire();
                Err(TaskError::TimedOut)
            }
            Err(PackrunError::Cancelled) => {
                self.cancelled.store(true, Ordering::SeqCst);
                guard.fire();
                Err(TaskError::Cancelled)
            }
            Err(e) => {
                guard.fire();
                Err(TaskError::Execution(Arc::new(e)))
            }
        }
    }

    fn start_execution(&self) -> crate::errors::Result<Execution> {
        let working_dir = match self.command.working_dir() {
            Some(dir) => dir.to_path_buf(),
            None => current_dir()?,
        };
        Execution::start(
            &self.launchers,
            &self.tool,
            Arc::clone(&self.sink),
            &working_dir,
            self.command.name(),
            self.command.arguments(),
            self.options,
        )
    }

    fn stop_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.interrupt.is_cancelled()
            || self.shutdown.is_cancelled()
    }

    fn set_state(&self, state: TaskState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn current_execution(&self) -> Option<Arc<Execution>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Publishes the live execution for `cancel` and withdraws it on drop, so
/// an abandoned run does not keep the tool process alive.
struct Registered<'a> {
    slot: &'a Mutex<Option<Arc<Execution>>>,
}

impl<'a> Registered<'a> {
    fn new(slot: &'a Mutex<Option<Arc<Execution>>>, execution: Arc<Execution>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(execution);
        Self { slot }
    }
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn cached(outcome: &Outcome, exclusive: bool) -> Outcome {
    if exclusive {
        return Err(TaskError::AlreadyStarted);
    }
    outcome.clone()
}

fn current_dir() -> crate::errors::Result<PathBuf> {
    std::env::current_dir().map_err(|e| PackrunError::io("resolving current dir", e))
}

/// `None` when the deadline ran out before `fut` completed.
async fn within<F: std::future::Future>(deadline: Deadline, fut: F) -> Option<F::Output> {
    if !deadline.is_relevant() {
        return Some(fut.await);
    }
    let deadline = deadline.checked().ok()?;
    tokio::time::timeout(deadline.remaining(), fut).await.ok()
}

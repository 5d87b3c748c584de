use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use packrun::command::{Command, FailureCode};
use packrun::deadline::Deadline;
use packrun::errors::{PackrunError, Result};
use packrun::exec::ToolCommand;

/// Life-cycle calls observed by a [`ScriptCommand`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Init,
    Success,
    Failure(FailureCode),
    Abort,
}

#[derive(Debug, Clone, Copy)]
pub enum InitBehaviour {
    Continue,
    Skip,
    Fail,
}

/// Tool that runs the command name as a shell script: `sh -c <script>`.
pub fn sh_tool() -> ToolCommand {
    ToolCommand::new("sh", ["-c"])
}

/// A command whose "name" is a shell script, to be run with [`sh_tool`].
///
/// Records every life-cycle hook so tests can assert on the order.
#[derive(Debug, Clone)]
pub struct ScriptCommand {
    script: String,
    arguments: Vec<String>,
    working_dir: Option<PathBuf>,
    init: InitBehaviour,
    init_delay: Option<Duration>,
    events: Arc<Mutex<Vec<LifecycleEvent>>>,
}

impl ScriptCommand {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            arguments: Vec::new(),
            working_dir: None,
            init: InitBehaviour::Continue,
            init_delay: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }

    pub fn with_init(mut self, init: InitBehaviour) -> Self {
        self.init = init;
        self
    }

    /// Sleep inside `init`, consuming part of the deadline.
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: LifecycleEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Command for ScriptCommand {
    fn name(&self) -> &str {
        &self.script
    }

    fn arguments(&self) -> &[String] {
        &self.arguments
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn init(&self, deadline: Deadline) -> Result<bool> {
        self.record(LifecycleEvent::Init);
        if let Some(delay) = self.init_delay {
            std::thread::sleep(delay);
        }
        deadline.checked()?;
        match self.init {
            InitBehaviour::Continue => Ok(true),
            InitBehaviour::Skip => Ok(false),
            InitBehaviour::Fail => Err(PackrunError::ConfigError("init refused".to_string())),
        }
    }

    fn on_success(&self) {
        self.record(LifecycleEvent::Success);
    }

    fn on_failure(&self, code: FailureCode) {
        self.record(LifecycleEvent::Failure(code));
    }

    fn on_abort(&self) {
        self.record(LifecycleEvent::Abort);
    }

    fn map_failure_code(&self, _exit_code: i32) -> FailureCode {
        FailureCode::Error
    }
}

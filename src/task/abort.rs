// src/task/abort.rs

use std::sync::Arc;

use tracing::debug;

use crate::command::Command;

/// Fires [`Command::on_abort`] unless disarmed.
///
/// Armed before a task starts working. If the lifecycle future is dropped
/// half way (runtime shutdown, caller gave up), the hook still runs.
pub struct AbortGuard {
    command: Option<Arc<dyn Command>>,
}

impl AbortGuard {
    pub fn arm(command: Arc<dyn Command>) -> Self {
        Self {
            command: Some(command),
        }
    }

    /// Run `on_abort` now. Later calls and the drop are no-ops.
    pub fn fire(&mut self) {
        if let Some(command) = self.command.take() {
            debug!(name = command.name(), "notifying command of abort");
            command.on_abort();
        }
    }

    pub fn disarm(&mut self) {
        self.command = None;
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

// src/message.rs

//! Machine-readable output protocol of the build tool.
//!
//! Every stdout line of the tool has the shape:
//!
//! ```text
//! <epoch-seconds>,<target-or-empty>,<type>,<data-part-0>,<data-part-1>,...
//! ```
//!
//! Commas inside data parts are encoded as [`COMMA_PLACEHOLDER`], and line
//! breaks as the two-character sequences `\n` / `\r`.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, trace};

/// Token the tool writes in place of a literal comma inside a data part.
pub const COMMA_PLACEHOLDER: &str = "%!(PACKER_COMMA)";

/// Human-facing output (`say`, `message`, `error`, ...).
pub const TYPE_UI: &str = "ui";
/// Number of artifacts produced by a build.
pub const TYPE_ARTIFACT_COUNT: &str = "artifact-count";

pub const DATA_UI_SAY: &str = "say";
pub const DATA_UI_MESSAGE: &str = "message";
pub const DATA_UI_ERROR: &str = "error";

/// One parsed unit of the tool's output protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub timestamp: SystemTime,
    pub target: Option<String>,
    pub kind: String,
    pub data: Vec<String>,
}

impl Message {
    /// Parse one protocol line.
    ///
    /// Returns `None` for lines with fewer than three fields or a timestamp
    /// that is not an integer number of seconds representable as a
    /// `SystemTime`.
    pub fn parse(line: &str) -> Option<Message> {
        let mut parts = line.split(',');

        let timestamp = parts.next()?.parse::<u64>().ok()?;
        let target = parts.next()?;
        let kind = parts.next()?;
        let timestamp = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;

        Some(Message {
            timestamp,
            target: if target.is_empty() {
                None
            } else {
                Some(target.to_string())
            },
            kind: kind.to_string(),
            data: parts.map(decode_data).collect(),
        })
    }

    pub fn is_ui(&self) -> bool {
        self.kind == TYPE_UI
    }

    /// Data part at `idx`, if present.
    pub fn data(&self, idx: usize) -> Option<&str> {
        self.data.get(idx).map(String::as_str)
    }
}

/// Undo the escaping applied by the tool to a single data part.
pub fn decode_data(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace(COMMA_PLACEHOLDER, ",")
}

/// Caller-supplied consumer of parsed messages.
pub type MessageSink = Arc<dyn Fn(Message) + Send + Sync>;

/// A sink that drops everything.
pub fn discard_sink() -> MessageSink {
    Arc::new(|_msg: Message| {})
}

/// Default sink: forwards the tool's UI output to `tracing`.
///
/// The first data part of a `ui` message picks the severity and the second
/// part is logged one record per embedded line.
pub fn log_sink() -> MessageSink {
    Arc::new(log_message)
}

fn log_message(msg: Message) {
    match msg.kind.as_str() {
        TYPE_UI => {
            let text = msg.data(1).unwrap_or_default();
            let target = msg.target.as_deref().unwrap_or_default();
            for line in text.split('\n') {
                match msg.data(0) {
                    Some(DATA_UI_SAY) | Some(DATA_UI_MESSAGE) => {
                        info!(target: "packrun::tool", builder = %target, "{}", line)
                    }
                    Some(DATA_UI_ERROR) => {
                        error!(target: "packrun::tool", builder = %target, "{}", line)
                    }
                    _ => debug!(target: "packrun::tool", builder = %target, "{}", line),
                }
            }
        }
        TYPE_ARTIFACT_COUNT => {
            info!(
                target: "packrun::tool",
                builder = ?msg.target,
                count = msg.data(0).unwrap_or("0"),
                "artifacts produced"
            );
        }
        other => {
            trace!(target: "packrun::tool", kind = %other, data = ?msg.data, "tool message");
        }
    }
}

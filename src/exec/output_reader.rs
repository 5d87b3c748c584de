// src/exec/output_reader.rs

//! Background consumer of the tool's stdout.

use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::message::{Message, MessageSink};

/// Reads protocol lines on a dedicated tokio task and forwards parsed
/// [`Message`]s to the sink, in the order the lines were produced.
///
/// The read loop owns a drop guard of `finished`, so the token fires once the
/// loop ends, whether it reached end of stream or was aborted.
pub struct OutputReader {
    finished: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl OutputReader {
    pub fn spawn<R>(input: R, sink: MessageSink) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let finished = CancellationToken::new();
        let guard = finished.clone().drop_guard();

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let mut lines = BufReader::new(input).lines();
            let mut delivered = 0usize;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match Message::parse(&line) {
                        Some(msg) => {
                            sink(msg);
                            delivered += 1;
                        }
                        None => trace!(%line, "dropping malformed output line"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "reading tool output failed");
                        break;
                    }
                }
            }

            debug!(delivered, "output reader reached end of stream");
        });

        Self {
            finished,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Wait until the read loop has observed end of stream.
    pub async fn await_termination(&self) {
        self.finished.cancelled().await;
    }

    /// Bounded [`OutputReader::await_termination`].
    ///
    /// When the bound expires the read loop is aborted, so nothing reaches the
    /// sink after this returns. Returns whether the stream drained on its own.
    pub async fn await_termination_within(&self, limit: Duration) -> bool {
        if tokio::time::timeout(limit, self.await_termination())
            .await
            .is_ok()
        {
            return true;
        }

        warn!(?limit, "output reader did not drain in time; aborting it");
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        false
    }
}

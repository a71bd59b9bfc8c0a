//! IPC bridge: stdin reader, stdout event emitter, and the chat runtime
//! that forwards transcripts to the host.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::{VoiceCommand, VoiceEvent};
use crate::chat::ChatRuntime;
use crate::error::VoiceError;

/// Emit a `VoiceEvent` as a JSON line on stdout and flush.
pub fn emit_event(event: &VoiceEvent) {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to serialize event: {}", e);
            return;
        }
    };
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Pipe may be closed.
    let _ = writeln!(handle, "{}", json);
    let _ = handle.flush();
}

pub fn emit_error(message: &str) {
    emit_event(&VoiceEvent::Error {
        message: message.to_string(),
        kind: None,
    });
}

/// Spawn a blocking thread that reads JSON lines from stdin, deserializes
/// them into `VoiceCommand`, and forwards them through the returned channel.
///
/// The thread exits when stdin is closed (host gone) or on a read error.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<VoiceCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(text) => {
                    let Some(cmd) = parse_command_line(&text) else {
                        continue;
                    };
                    debug!(?cmd, "Received command");
                    if tx.send(cmd).is_err() {
                        break; // main task is gone
                    }
                }
                Err(e) => {
                    error!("stdin read error: {}", e);
                    break;
                }
            }
        }
        debug!("stdin reader thread exiting");
    });

    rx
}

/// Parse one stdin line. Blank lines are skipped; malformed ones are
/// reported to the host as an error event.
fn parse_command_line(line: &str) -> Option<VoiceCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<VoiceCommand>(trimmed) {
        Ok(cmd) => Some(cmd),
        Err(e) => {
            error!("Invalid JSON command: {} (input: {})", e, trimmed);
            emit_error(&format!("Invalid JSON command: {}", e));
            None
        }
    }
}

/// Where outgoing events go; stdout in the binary.
pub type Emitter = Arc<dyn Fn(VoiceEvent) + Send + Sync>;

struct PendingReply {
    request_id: String,
    tx: oneshot::Sender<Result<String, VoiceError>>,
}

/// [`ChatRuntime`] backed by the host process.
///
/// `reply()` emits a `user_reply` event and waits for the host to answer with
/// `chat_reply` or `chat_error`, which the command loop routes to
/// [`deliver`](Self::deliver) / [`fail`](Self::fail). Only one request is
/// outstanding at a time; a newer request supersedes an older one.
pub struct IpcChatRuntime {
    emit: Emitter,
    pending: Mutex<Option<PendingReply>>,
}

impl IpcChatRuntime {
    /// Runtime that writes its requests to stdout.
    pub fn new() -> Self {
        Self::with_emitter(Arc::new(|event| emit_event(&event)))
    }

    pub fn with_emitter(emit: Emitter) -> Self {
        Self {
            emit,
            pending: Mutex::new(None),
        }
    }

    /// Resolve the outstanding request with the host's answer.
    ///
    /// Returns `false` if nothing was waiting or the id does not match.
    pub fn deliver(&self, text: String, request_id: Option<&str>) -> bool {
        self.resolve(Ok(text), request_id)
    }

    /// Fail the outstanding request.
    pub fn fail(&self, message: String, request_id: Option<&str>) -> bool {
        self.resolve(
            Err(VoiceError::NetworkFailure(format!("chat runtime: {message}"))),
            request_id,
        )
    }

    fn resolve(&self, outcome: Result<String, VoiceError>, request_id: Option<&str>) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let matches = match (pending.as_ref(), request_id) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(p), Some(id)) => p.request_id == id,
        };
        if !matches {
            warn!(request_id = ?request_id, "Chat answer with no matching request");
            return false;
        }
        match pending.take() {
            // The turn may have been cancelled in the meantime.
            Some(p) => p.tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl Default for IpcChatRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatRuntime for IpcChatRuntime {
    async fn reply(&self, text: &str) -> Result<String, VoiceError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if pending.is_some() {
                debug!("Superseding an unanswered chat request");
            }
            *pending = Some(PendingReply {
                request_id: request_id.clone(),
                tx,
            });
        }

        debug!(request_id = %request_id, chars = text.len(), "Asking host for a reply");
        (self.emit)(VoiceEvent::UserReply {
            request_id,
            text: text.to_string(),
        });

        rx.await.map_err(|_| {
            VoiceError::NetworkFailure("chat request was superseded before an answer".into())
        })?
    }
}

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, RunnerError};
use crate::paths::socket_path;
use crate::store::Snapshot;

/// The only command the status channel answers.
pub const STATUS_COMMAND: &str = "status";

/// Size of the single read the server performs per request.
pub const REQUEST_BUFFER: usize = 1024;

/// One directory in a status reply. Field names are part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// Item being processed; empty before the first item starts.
    pub actual: String,
    pub pendientes: Vec<String>,
}

/// Directory name → progress, sorted by name.
pub type StatusDocument = BTreeMap<String, StatusEntry>;

/// Reply to anything other than [`STATUS_COMMAND`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

pub fn status_document(snapshot: Snapshot) -> StatusDocument {
    snapshot
        .into_iter()
        .map(|(name, status)| {
            (
                name.0,
                StatusEntry {
                    actual: status.current.unwrap_or_default(),
                    pendientes: status.pending,
                },
            )
        })
        .collect()
}

/// Server side: the bytes to send back for a trimmed request.
pub fn reply_for(
    request: &str,
    snapshot: impl FnOnce() -> Snapshot,
) -> Result<Vec<u8>, RunnerError> {
    let bytes = if request == STATUS_COMMAND {
        serde_json::to_vec(&status_document(snapshot()))?
    } else {
        serde_json::to_vec(&ErrorReply {
            error: format!("unknown command '{request}'"),
        })?
    };
    Ok(bytes)
}

/// Send one command to the status socket and return the raw reply.
pub fn send_request(socket: &Path, command: &str) -> Result<Vec<u8>, RunnerError> {
    if !socket.exists() {
        return Err(RunnerError::NotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
        ) {
            RunnerError::NotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    stream
        .write_all(command.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream
        .shutdown(Shutdown::Write)
        .map_err(|e| io_err(socket, e))?;

    let mut reply = Vec::new();
    stream
        .read_to_end(&mut reply)
        .map_err(|e| io_err(socket, e))?;
    if reply.is_empty() {
        return Err(RunnerError::Protocol(
            "server closed connection before responding".to_string(),
        ));
    }
    Ok(reply)
}

/// Query the run whose runtime directory is `runtime_root`, retrying briefly
/// while its socket is missing.
pub fn request_status(runtime_root: &Path) -> Result<StatusDocument, RunnerError> {
    request_status_at(&socket_path(runtime_root))
}

pub fn request_status_at(socket: &Path) -> Result<StatusDocument, RunnerError> {
    let mut last_not_running: Option<RunnerError> = None;
    for attempt in 0..5 {
        match send_request(socket, STATUS_COMMAND) {
            Ok(reply) => return parse_status_reply(&reply),
            Err(err @ RunnerError::NotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        RunnerError::Protocol("status retry loop exited unexpectedly".to_string())
    }))
}

/// Client side: a status document, or the server's error reply as an error.
pub fn parse_status_reply(reply: &[u8]) -> Result<StatusDocument, RunnerError> {
    let value: Value = serde_json::from_slice(reply)?;
    if let Some(Value::String(message)) = value.get("error") {
        return Err(RunnerError::Protocol(message.clone()));
    }
    Ok(serde_json::from_value(value)?)
}

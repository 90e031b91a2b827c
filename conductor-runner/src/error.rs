use std::path::PathBuf;

use thiserror::Error;

use conductor_core::{ConfigError, DirectoryName};

/// Error surface for the run orchestration and the status channel.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "conductor is already running (lock file {}{})",
        .path.display(),
        holder_suffix(.pid)
    )]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    #[error("status socket already in use: {}", .socket.display())]
    EndpointInUse { socket: PathBuf },

    #[error("conductor is not running (no status socket at {})", .socket.display())]
    NotRunning { socket: PathBuf },

    #[error("status protocol error: {0}")]
    Protocol(String),

    #[error("directory '{0}' already has an active worker")]
    DuplicateEntry(DirectoryName),

    #[error("failed to start '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    ProcessFailed {
        program: String,
        status: String,
        stderr: String,
    },
}

fn holder_suffix(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(", held by pid {pid}"))
        .unwrap_or_default()
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RunnerError {
    RunnerError::Io {
        path: path.into(),
        source,
    }
}

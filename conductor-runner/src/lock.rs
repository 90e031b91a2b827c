//! Host-wide single-instance guard.
//!
//! The marker lives in the shared runtime directory (see [`crate::paths`]),
//! so every user and every `$HOME` on the host contends for the same file.
//! The marker is created with create-new semantics, so the existence test and
//! the claim are one atomic filesystem operation. Dropping the guard removes
//! the marker, which covers normal returns, `?` early exits and unwinding
//! panics. A marker left behind by a killed process must be removed by hand.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, RunnerError};
use crate::paths::{ensure_runtime_dir, lock_path};

/// What the lock file records about its holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Held for the whole `run`; releases the marker on drop.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Claim `<root>/conductor.lock`.
    pub fn acquire_at(root: &Path) -> Result<Self, RunnerError> {
        Self::acquire(lock_path(root))
    }

    /// Claim the marker at `path`, failing with [`RunnerError::AlreadyRunning`]
    /// if it already exists.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, RunnerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            ensure_runtime_dir(parent)?;
        }

        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let pid = read_holder(&path).map(|holder| holder.pid);
                return Err(RunnerError::AlreadyRunning { path, pid });
            }
            Err(err) => return Err(io_err(&path, err)),
        };

        // From here on the guard owns the marker, even if writing the holder fails.
        let lock = Self { path };
        let holder = LockHolder {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        serde_json::to_writer(&mut file, &holder)?;
        file.flush().map_err(|e| io_err(&lock.path, e))?;

        tracing::debug!(path = %lock.path.display(), pid = holder.pid, "instance lock acquired");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "instance lock released"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "failed to remove instance lock",
            ),
        }
    }
}

/// Best effort: a half-written or foreign marker still means "held".
pub fn read_holder(path: &Path) -> Option<LockHolder> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

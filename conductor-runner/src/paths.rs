//! Host-wide runtime locations.
//!
//! The instance lock and the status socket live in one fixed directory
//! shared by every user of the host: `/tmp/conductor`, unless
//! `CONDUCTOR_RUNTIME_DIR` names another one. Nothing here looks at `$HOME`.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{io_err, RunnerError};

pub const DEFAULT_RUNTIME_DIR: &str = "/tmp/conductor";
pub const RUNTIME_DIR_ENV: &str = "CONDUCTOR_RUNTIME_DIR";
pub const LOCK_FILE: &str = "conductor.lock";
pub const STATUS_SOCKET: &str = "conductor.sock";

/// Mode of a runtime directory created here: world-writable with the
/// sticky bit, like `/tmp`, so any user can claim the lock but only its
/// holder can remove it.
const RUNTIME_DIR_MODE: u32 = 0o1777;

/// The runtime directory for this host, honouring `CONDUCTOR_RUNTIME_DIR`.
pub fn runtime_root() -> PathBuf {
    runtime_root_from(std::env::var_os(RUNTIME_DIR_ENV))
}

pub fn runtime_root_from(overridden: Option<OsString>) -> PathBuf {
    overridden
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNTIME_DIR))
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

pub fn socket_path(root: &Path) -> PathBuf {
    root.join(STATUS_SOCKET)
}

/// Create `root` if it is missing. Only a directory created by this call
/// gets its mode changed; an existing one is used as is.
pub fn ensure_runtime_dir(root: &Path) -> Result<(), RunnerError> {
    if let Some(parent) = root.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    match fs::create_dir(root) {
        Ok(()) => fs::set_permissions(root, fs::Permissions::from_mode(RUNTIME_DIR_MODE))
            .map_err(|e| io_err(root, e)),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(io_err(root, err)),
    }
}

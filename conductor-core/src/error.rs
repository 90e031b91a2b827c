//! Error types for conductor-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the configuration file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load, with the offending file path.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    ConfigNotFound { path: PathBuf },

    /// `dirs::home_dir()` returned `None`; `~/.conductor/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("directory entry #{index} has an empty name")]
    EmptyName { index: usize },

    #[error("directory '{0}' is configured more than once")]
    DuplicateDirectory(String),

    /// A field required by the directory's `type` is absent or empty.
    #[error("directory '{directory}' requires field '{field}'")]
    MissingField {
        directory: String,
        field: &'static str,
    },
}

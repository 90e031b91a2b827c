//! JSON configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.conductor/
//!   config.json        (default; `conductor run --config <path>` overrides)
//! ```
//!
//! # API pattern
//!
//! Path helpers come in two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Process names are resolved here, once: a directory's `process` either
//! names an entry of the top-level `processes` table or is itself the program.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{DirectoryConfig, DirectoryName, ProcessSpec, SourceKind};

pub const DEFAULT_REGION: &str = "us-east-1";

// ---------------------------------------------------------------------------
// 1. File schema
// ---------------------------------------------------------------------------

/// Root of the configuration file, as written on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub directories: Vec<DirectoryEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub processes: BTreeMap<String, ProcessEntry>,
    #[serde(default)]
    pub s3: S3Settings,
}

/// One `directories[]` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub process: String,
    #[serde(default)]
    pub mark_processed: bool,
}

/// A named external program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Object-store client settings shared by every `s3` directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Settings {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible stores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
        }
    }
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Validated configuration, ready for the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub directories: Vec<DirectoryConfig>,
    pub s3: S3Settings,
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.conductor/config.json`. Pure, no I/O.
pub fn default_config_path_at(home: &Path) -> PathBuf {
    home.join(".conductor").join("config.json")
}

/// `default_config_path_at` convenience wrapper.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(default_config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Read, parse and validate the configuration at `path`.
///
/// Returns `ConfigError::ConfigNotFound` if absent, `ConfigError::Parse`
/// (with path) if the JSON is malformed, and a validation error if a
/// directory entry is inconsistent.
pub fn load_at(path: &Path) -> Result<Settings, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file: ConfigFile = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.resolve()
}

impl ConfigFile {
    /// Validate every entry and bind each directory to its process.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        let mut seen = HashSet::new();
        let mut directories = Vec::with_capacity(self.directories.len());

        for (index, entry) in self.directories.iter().enumerate() {
            let name = entry.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(name.to_string()) {
                return Err(ConfigError::DuplicateDirectory(name.to_string()));
            }

            let bucket_or_root = match entry.kind {
                SourceKind::ObjectStore => non_empty(entry.bucket.as_deref())
                    .ok_or_else(|| missing(name, "bucket"))?
                    .to_string(),
                SourceKind::LocalFs => entry
                    .path
                    .as_ref()
                    .filter(|p| !p.as_os_str().is_empty())
                    .ok_or_else(|| missing(name, "path"))?
                    .display()
                    .to_string(),
            };

            let process_name = non_empty(Some(entry.process.as_str()))
                .ok_or_else(|| missing(name, "process"))?;
            let process = match self.processes.get(process_name) {
                Some(def) => ProcessSpec {
                    name: process_name.to_string(),
                    program: def.command.clone(),
                    args: def.args.clone(),
                },
                None => ProcessSpec {
                    name: process_name.to_string(),
                    program: process_name.to_string(),
                    args: Vec::new(),
                },
            };

            directories.push(DirectoryConfig {
                name: DirectoryName::from(name),
                kind: entry.kind,
                bucket_or_root,
                prefix: entry.prefix.clone().unwrap_or_default(),
                process,
                mark_processed: entry.mark_processed,
            });
        }

        Ok(Settings {
            directories,
            s3: self.s3.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// 4. Internal helpers
// ---------------------------------------------------------------------------

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn missing(directory: &str, field: &'static str) -> ConfigError {
    ConfigError::MissingField {
        directory: directory.to_string(),
        field,
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

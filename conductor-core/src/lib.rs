//! Conductor core library: domain types, configuration loading, errors.
//!
//! - [`types`]: directory, work item and progress types
//! - [`config`]: JSON configuration loader and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ConfigFile, S3Settings, Settings};
pub use error::ConfigError;
pub use types::{
    DirectoryConfig, DirectoryName, DirectoryStatus, ProcessSpec, SourceKind, WorkItem,
};

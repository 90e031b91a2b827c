//! Invoking a directory's bound external program for one item.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use conductor_core::{DirectoryName, ProcessSpec, WorkItem};

use crate::error::RunnerError;

pub const ENV_DIRECTORY: &str = "CONDUCTOR_DIRECTORY";
pub const ENV_ITEM: &str = "CONDUCTOR_ITEM";

/// Longest stderr excerpt carried in a failure.
const STDERR_TAIL: usize = 2048;

/// Runs the per-item work. Blocks the calling worker until done; no timeout.
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    async fn invoke(&self, directory: &DirectoryName, item: &WorkItem) -> Result<(), RunnerError>;
}

/// `program args... <item-id>`, with the directory and item also in the environment.
#[derive(Debug, Clone)]
pub struct CommandProcessor {
    spec: ProcessSpec,
}

impl CommandProcessor {
    pub fn new(spec: ProcessSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl ItemProcessor for CommandProcessor {
    async fn invoke(&self, directory: &DirectoryName, item: &WorkItem) -> Result<(), RunnerError> {
        let output = Command::new(&self.spec.program)
            .args(&self.spec.args)
            .arg(&item.id)
            .env(ENV_DIRECTORY, &directory.0)
            .env(ENV_ITEM, &item.id)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RunnerError::ProcessSpawn {
                program: self.spec.program.clone(),
                source,
            })?;

        if !output.stdout.is_empty() {
            tracing::debug!(
                directory = %directory,
                item = %item.id,
                stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                "process output",
            );
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim_end();
        let start = stderr.len().saturating_sub(STDERR_TAIL);
        let start = (start..stderr.len())
            .find(|i| stderr.is_char_boundary(*i))
            .unwrap_or(stderr.len());
        Err(RunnerError::ProcessFailed {
            program: self.spec.program.clone(),
            status: output.status.to_string(),
            stderr: stderr[start..].to_string(),
        })
    }
}

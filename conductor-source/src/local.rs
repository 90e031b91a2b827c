//! Local-filesystem backend: the regular files directly inside one folder.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use conductor_core::WorkItem;

use crate::error::{io_err, SourceError};
use crate::{order_items, WorkSource, PROCESSED_SENTINEL};

/// Files in `root` whose name starts with `prefix`. Not recursive.
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    prefix: String,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl WorkSource for LocalSource {
    async fn list(&self) -> Result<Vec<WorkItem>, SourceError> {
        let root = self.root.clone();
        let prefix = self.prefix.clone();
        let items = tokio::task::spawn_blocking(move || list_blocking(&root, &prefix)).await??;
        Ok(order_items(items))
    }

    async fn mark_processed(&self, item: &WorkItem) -> Result<(), SourceError> {
        let from = PathBuf::from(&item.id);
        let name = from
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let to = from.with_file_name(format!("{PROCESSED_SENTINEL}{name}"));

        tokio::fs::rename(&from, &to)
            .await
            .map_err(|e| io_err(&from, e))?;
        tracing::info!(from = %from.display(), to = %to.display(), "file renamed");
        Ok(())
    }
}

fn list_blocking(root: &Path, prefix: &str) -> Result<Vec<WorkItem>, SourceError> {
    let entries = fs::read_dir(root).map_err(|e| io_err(root, e))?;

    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(root, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if !file_type.is_file() {
            continue;
        }
        // Ids are handed to processes as text; a lossy id would name another file.
        let Some(id) = path.to_str() else {
            tracing::warn!(path = %path.display(), "skipping file with a non-UTF-8 name");
            continue;
        };
        if !entry.file_name().to_string_lossy().starts_with(prefix) {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map_err(|e| io_err(&path, e))?;
        items.push(WorkItem::new(id, DateTime::<Utc>::from(modified)));
    }
    Ok(items)
}

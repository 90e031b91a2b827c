//! # conductor-source
//!
//! Where work items come from. Every configured directory is backed by one
//! [`Source`], resolved once from its [`DirectoryConfig`]; workers only see
//! the [`WorkSource`] capability.
//!
//! Listings are always complete (pagination is followed internally), drop
//! items already carrying the [`PROCESSED_SENTINEL`], and come back sorted
//! oldest first.

pub mod error;
pub mod local;
pub mod s3;

use async_trait::async_trait;

use conductor_core::{DirectoryConfig, S3Settings, SourceKind, WorkItem};

pub use error::SourceError;
pub use local::LocalSource;
pub use s3::S3Source;

/// Leading character that marks an item as already processed.
pub const PROCESSED_SENTINEL: char = '*';

/// Capability every work-item backend provides.
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Full, filtered, ordered listing. An empty result is not an error.
    async fn list(&self) -> Result<Vec<WorkItem>, SourceError>;

    /// Rename `item` so later listings skip it.
    async fn mark_processed(&self, item: &WorkItem) -> Result<(), SourceError>;
}

/// The closed set of backends a directory can be bound to.
#[derive(Debug, Clone)]
pub enum Source {
    S3(S3Source),
    Local(LocalSource),
}

impl Source {
    /// Build one source per directory, in configuration order. The object-store
    /// client is only created when at least one directory needs it.
    pub async fn resolve_all(
        directories: &[DirectoryConfig],
        settings: &S3Settings,
    ) -> Vec<Source> {
        let mut client: Option<aws_sdk_s3::Client> = None;
        let mut sources = Vec::with_capacity(directories.len());

        for dir in directories {
            let source = match dir.kind {
                SourceKind::ObjectStore => {
                    let client = match &client {
                        Some(existing) => existing.clone(),
                        None => {
                            let created = s3::connect(settings).await;
                            client = Some(created.clone());
                            created
                        }
                    };
                    Source::S3(S3Source::new(
                        client,
                        dir.bucket_or_root.clone(),
                        dir.prefix.clone(),
                    ))
                }
                SourceKind::LocalFs => {
                    Source::Local(LocalSource::new(&dir.bucket_or_root, dir.prefix.clone()))
                }
            };
            sources.push(source);
        }
        sources
    }
}

#[async_trait]
impl WorkSource for Source {
    async fn list(&self) -> Result<Vec<WorkItem>, SourceError> {
        match self {
            Source::S3(source) => source.list().await,
            Source::Local(source) => source.list().await,
        }
    }

    async fn mark_processed(&self, item: &WorkItem) -> Result<(), SourceError> {
        match self {
            Source::S3(source) => source.mark_processed(item).await,
            Source::Local(source) => source.mark_processed(item).await,
        }
    }
}

/// Whether `id` (or its final path segment) starts with the sentinel.
pub fn is_marked_processed(id: &str) -> bool {
    id.starts_with(PROCESSED_SENTINEL) || file_name(id).starts_with(PROCESSED_SENTINEL)
}

/// `id` with the sentinel inserted before its final path segment.
pub fn marked_id(id: &str) -> String {
    match id.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/{PROCESSED_SENTINEL}{name}"),
        None => format!("{PROCESSED_SENTINEL}{id}"),
    }
}

/// Drop sentinel-marked items and sort the rest oldest first, ties by id.
pub fn order_items(items: impl IntoIterator<Item = WorkItem>) -> Vec<WorkItem> {
    let mut items: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| !is_marked_processed(&item.id))
        .collect();
    items.sort();
    items
}

fn file_name(id: &str) -> &str {
    id.rsplit_once('/').map(|(_, name)| name).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, secs: i64) -> WorkItem {
        WorkItem::new(id, Utc.timestamp_opt(secs, 0).single().expect("timestamp"))
    }

    #[test]
    fn sentinel_detection_checks_key_and_file_name() {
        assert!(is_marked_processed("*dir/file.csv"));
        assert!(is_marked_processed("dir/*file.csv"));
        assert!(is_marked_processed("*file.csv"));
        assert!(!is_marked_processed("dir/file*.csv"));
        assert!(!is_marked_processed("dir/"));
    }

    #[test]
    fn marked_id_prefixes_last_segment() {
        assert_eq!(marked_id("in/2024/report.pdf"), "in/2024/*report.pdf");
        assert_eq!(marked_id("report.pdf"), "*report.pdf");
        assert!(is_marked_processed(&marked_id("in/report.pdf")));
    }

    #[test]
    fn order_items_filters_and_sorts() {
        let ordered = order_items(vec![
            item("b", 3),
            item("*done", 0),
            item("c", 2),
            item("dir/*old", 1),
            item("a", 1),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "b"]);
    }

    #[test]
    fn order_items_accepts_empty_listing() {
        assert!(order_items(Vec::new()).is_empty());
    }
}

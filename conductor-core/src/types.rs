//! Domain types for Conductor.
//!
//! Directory configuration is immutable once loaded; [`DirectoryStatus`] is
//! the per-directory progress record owned by exactly one worker.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed name for a configured directory (work queue).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectoryName(pub String);

impl fmt::Display for DirectoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DirectoryName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DirectoryName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Where a directory's work items come from. Serialized as the `type`
/// field of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "s3")]
    ObjectStore,
    #[serde(rename = "local")]
    LocalFs,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::ObjectStore => write!(f, "s3"),
            SourceKind::LocalFs => write!(f, "local"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// The external program bound to a directory, resolved at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Name the directory refers to the process by.
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

/// One configured directory, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub name: DirectoryName,
    pub kind: SourceKind,
    /// Bucket for [`SourceKind::ObjectStore`], root path for [`SourceKind::LocalFs`].
    pub bucket_or_root: String,
    pub prefix: String,
    pub process: ProcessSpec,
    /// Rename each item with the processed sentinel after a successful run.
    pub mark_processed: bool,
}

/// One unit of work: an object key or file path plus its ordering timestamp.
///
/// Items order by `last_modified` ascending, ties broken by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    pub id: String,
    pub last_modified: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(id: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            last_modified,
        }
    }
}

impl Ord for WorkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.last_modified
            .cmp(&other.last_modified)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for WorkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Progress of one active directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectoryStatus {
    /// Item currently handed to the external process, if any.
    pub current: Option<String>,
    /// Items not yet started, in processing order.
    pub pending: Vec<String>,
}

impl DirectoryStatus {
    /// Fresh entry for a directory that has listed its items but not begun.
    pub fn registered(items: &[WorkItem]) -> Self {
        Self {
            current: None,
            pending: items.iter().map(|item| item.id.clone()).collect(),
        }
    }

    /// Move the head of `pending` into `current`. Returns the started id.
    pub fn advance(&mut self) -> Option<&str> {
        if self.pending.is_empty() {
            self.current = None;
            return None;
        }
        self.current = Some(self.pending.remove(0));
        self.current.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
    }

    #[test]
    fn newtype_display() {
        assert_eq!(DirectoryName::from("inbox").to_string(), "inbox");
        assert_eq!(SourceKind::ObjectStore.to_string(), "s3");
        assert_eq!(SourceKind::LocalFs.to_string(), "local");
    }

    #[test]
    fn work_items_order_by_timestamp_then_id() {
        let mut items = vec![
            WorkItem::new("b", at(3)),
            WorkItem::new("c", at(2)),
            WorkItem::new("z", at(1)),
            WorkItem::new("a", at(1)),
        ];
        items.sort();
        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "z", "c", "b"]);
    }

    #[test]
    fn advance_walks_pending_in_order() {
        let items = vec![WorkItem::new("a", at(1)), WorkItem::new("b", at(2))];
        let mut status = DirectoryStatus::registered(&items);
        assert_eq!(status.current, None);

        assert_eq!(status.advance(), Some("a"));
        assert_eq!(status.pending, vec!["b".to_string()]);
        assert_eq!(status.advance(), Some("b"));
        assert!(status.pending.is_empty());
        assert_eq!(status.advance(), None);
        assert_eq!(status.current, None);
    }

    #[test]
    fn source_kind_uses_wire_names() {
        let kind: SourceKind = serde_json::from_str("\"s3\"").expect("parse s3");
        assert_eq!(kind, SourceKind::ObjectStore);
        let kind: SourceKind = serde_json::from_str("\"local\"").expect("parse local");
        assert_eq!(kind, SourceKind::LocalFs);
        assert!(serde_json::from_str::<SourceKind>("\"ftp\"").is_err());
    }
}

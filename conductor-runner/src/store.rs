//! Shared progress state for the active run.
//!
//! One mutex guards the whole map; every read and write takes it for a short,
//! synchronous critical section (never across an `.await` or a process call).
//! Entries are only reachable for mutation through the [`ActiveEntry`]
//! handed to the worker that registered them, and dropping that handle
//! removes the entry.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use conductor_core::{DirectoryName, DirectoryStatus, WorkItem};

use crate::error::RunnerError;

pub type Snapshot = BTreeMap<DirectoryName, DirectoryStatus>;

/// Cheap-to-clone handle to the run's progress map.
#[derive(Debug, Clone, Default)]
pub struct StatusStore {
    inner: Arc<Mutex<Snapshot>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name` as active with `items` pending and nothing current.
    pub fn register(
        &self,
        name: &DirectoryName,
        items: &[WorkItem],
    ) -> Result<ActiveEntry, RunnerError> {
        let mut map = self.lock();
        if map.contains_key(name) {
            return Err(RunnerError::DuplicateEntry(name.clone()));
        }
        map.insert(name.clone(), DirectoryStatus::registered(items));
        Ok(ActiveEntry {
            store: self.clone(),
            name: name.clone(),
        })
    }

    /// Point-in-time copy of every active directory.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        // Critical sections are single map operations; a poisoned map is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A worker's exclusive handle on its own entry.
#[derive(Debug)]
pub struct ActiveEntry {
    store: StatusStore,
    name: DirectoryName,
}

impl ActiveEntry {
    /// Move the head of `pending` into `current` in one locked update.
    pub fn advance(&self) -> Option<String> {
        let mut map = self.store.lock();
        map.get_mut(&self.name)
            .and_then(|status| status.advance().map(str::to_string))
    }
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        self.store.lock().remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn items(ids: &[&str]) -> Vec<WorkItem> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                WorkItem::new(*id, Utc.timestamp_opt(i as i64, 0).single().expect("ts"))
            })
            .collect()
    }

    #[test]
    fn register_advance_and_drop() {
        let store = StatusStore::new();
        let name = DirectoryName::from("inbox");
        let entry = store.register(&name, &items(&["a", "b"])).expect("register");

        let snap = store.snapshot();
        assert_eq!(snap[&name].current, None);
        assert_eq!(snap[&name].pending, vec!["a", "b"]);

        assert_eq!(entry.advance().as_deref(), Some("a"));
        let snap = store.snapshot();
        assert_eq!(snap[&name].current.as_deref(), Some("a"));
        assert_eq!(snap[&name].pending, vec!["b"]);

        drop(entry);
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn advance_follows_registration_order_then_stops() {
        let store = StatusStore::new();
        let name = DirectoryName::from("inbox");
        let entry = store
            .register(&name, &items(&["a", "b", "c"]))
            .expect("register");

        let walked: Vec<String> = std::iter::from_fn(|| entry.advance()).collect();
        assert_eq!(walked, vec!["a", "b", "c"]);
        let snap = store.snapshot();
        assert_eq!(snap[&name].current, None, "exhausted queue has nothing current");
        assert!(snap[&name].pending.is_empty());
    }

    #[test]
    fn duplicate_register_is_rejected() {
        let store = StatusStore::new();
        let name = DirectoryName::from("inbox");
        let _entry = store.register(&name, &[]).expect("register");
        let err = store.register(&name, &[]).unwrap_err();
        assert!(matches!(err, RunnerError::DuplicateEntry(ref n) if n == &name));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = StatusStore::new();
        let name = DirectoryName::from("inbox");
        let entry = store.register(&name, &items(&["a"])).expect("register");

        let before = store.snapshot();
        entry.advance();
        assert_eq!(before[&name].current, None, "earlier snapshot must not change");
    }

    #[test]
    fn entries_are_independent() {
        let store = StatusStore::new();
        let a = store
            .register(&DirectoryName::from("a"), &items(&["a1"]))
            .expect("register a");
        let b = store
            .register(&DirectoryName::from("b"), &items(&["b1", "b2"]))
            .expect("register b");

        b.advance();
        drop(a);

        let snap = store.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[&DirectoryName::from("b")].current.as_deref(), Some("b1"));
    }
}

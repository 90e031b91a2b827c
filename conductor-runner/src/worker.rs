//! One directory, driven to completion.
//!
//! The worker lists its source once, publishes the full queue, then walks it
//! strictly in order. A failing item is logged and skipped; a failing listing
//! ends the directory without ever publishing an entry.

use std::sync::Arc;

use serde::Serialize;

use conductor_core::DirectoryName;
use conductor_source::WorkSource;

use crate::process::ItemProcessor;
use crate::store::StatusStore;

/// What happened to one directory during a run.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DirectoryReport {
    pub directory: String,
    pub processed: Vec<String>,
    pub failed: Vec<String>,
    /// Set when the directory stopped early (listing failed, worker panicked).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DirectoryReport {
    pub fn new(directory: &DirectoryName) -> Self {
        Self {
            directory: directory.0.clone(),
            ..Self::default()
        }
    }
}

pub struct DirectoryWorker {
    name: DirectoryName,
    source: Arc<dyn WorkSource>,
    processor: Arc<dyn ItemProcessor>,
    store: StatusStore,
    mark_processed: bool,
}

impl DirectoryWorker {
    pub fn new(
        name: DirectoryName,
        source: Arc<dyn WorkSource>,
        processor: Arc<dyn ItemProcessor>,
        store: StatusStore,
    ) -> Self {
        Self {
            name,
            source,
            processor,
            store,
            mark_processed: false,
        }
    }

    /// Rename each successfully processed item through its source.
    pub fn mark_processed(mut self, enabled: bool) -> Self {
        self.mark_processed = enabled;
        self
    }

    pub async fn run(self) -> DirectoryReport {
        let mut report = DirectoryReport::new(&self.name);

        let items = match self.source.list().await {
            Ok(items) => items,
            Err(err) => {
                tracing::error!(directory = %self.name, error = %err, "listing failed");
                report.error = Some(err.to_string());
                return report;
            }
        };

        let entry = match self.store.register(&self.name, &items) {
            Ok(entry) => entry,
            Err(err) => {
                tracing::error!(directory = %self.name, error = %err, "cannot publish progress");
                report.error = Some(err.to_string());
                return report;
            }
        };
        tracing::info!(directory = %self.name, items = items.len(), "directory started");

        for item in &items {
            let current = entry.advance();
            debug_assert_eq!(
                current.as_deref(),
                Some(item.id.as_str()),
                "published queue out of step with the listing",
            );
            tracing::info!(directory = %self.name, item = %item.id, "processing item");

            if let Err(err) = self.processor.invoke(&self.name, item).await {
                tracing::warn!(directory = %self.name, item = %item.id, error = %err, "item failed");
                report.failed.push(item.id.clone());
                continue;
            }

            if self.mark_processed {
                if let Err(err) = self.source.mark_processed(item).await {
                    tracing::warn!(
                        directory = %self.name,
                        item = %item.id,
                        error = %err,
                        "item processed but could not be marked",
                    );
                    report.failed.push(item.id.clone());
                    continue;
                }
            }

            tracing::info!(directory = %self.name, item = %item.id, "item processed");
            report.processed.push(item.id.clone());
        }

        drop(entry);
        tracing::info!(
            directory = %self.name,
            processed = report.processed.len(),
            failed = report.failed.len(),
            "directory finished",
        );
        report
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn worker(
        name: &str,
        source: Arc<FakeSource>,
        recorder: Arc<Recorder>,
    ) -> DirectoryWorker {
        let store = recorder.store.clone();
        DirectoryWorker::new(DirectoryName::from(name), source, recorder, store)
    }

    #[tokio::test]
    async fn processes_oldest_first() {
        let recorder = Arc::new(Recorder::default());
        let source = Arc::new(FakeSource::new(vec![item("a", 1), item("b", 3), item("c", 2)]));

        let report = worker("inbox", source, recorder.clone()).run().await;

        assert_eq!(recorder.ids(), vec!["a", "c", "b"]);
        assert_eq!(report.processed, vec!["a", "c", "b"]);
        assert!(report.failed.is_empty());
        assert!(report.error.is_none());
        assert!(recorder.store.is_empty(), "entry must be removed on completion");
    }

    #[tokio::test]
    async fn current_plus_pending_is_the_unstarted_suffix() {
        let recorder = Arc::new(Recorder::default());
        let items = vec![item("a", 1), item("b", 2), item("c", 3), item("d", 4)];
        let source = Arc::new(FakeSource::new(items.clone()));

        worker("inbox", source, recorder.clone()).run().await;

        let calls = recorder.calls.lock().expect("lock").clone();
        assert_eq!(calls.len(), items.len());
        for (index, (id, seen)) in calls.iter().enumerate() {
            let seen = seen.as_ref().expect("entry visible while processing");
            assert_eq!(seen.current.as_deref(), Some(id.as_str()));
            let mut observed = vec![seen.current.clone().expect("current")];
            observed.extend(seen.pending.iter().cloned());
            let expected: Vec<String> = items[index..].iter().map(|i| i.id.clone()).collect();
            assert_eq!(observed, expected);
        }
    }

    #[tokio::test]
    async fn failed_item_does_not_stop_the_directory() {
        let recorder = Arc::new(Recorder {
            fail_on: ["b".to_string()].into_iter().collect(),
            ..Recorder::default()
        });
        let source = Arc::new(FakeSource::new(vec![item("a", 1), item("b", 2), item("c", 3)]));

        let report = worker("inbox", source, recorder.clone()).run().await;

        assert_eq!(recorder.ids(), vec!["a", "b", "c"]);
        assert_eq!(report.processed, vec!["a", "c"]);
        assert_eq!(report.failed, vec!["b"]);
    }

    #[tokio::test]
    async fn empty_listing_registers_and_removes_without_invoking() {
        let recorder = Arc::new(Recorder::default());
        let source = Arc::new(FakeSource::new(Vec::new()));

        let report = worker("inbox", source, recorder.clone()).run().await;

        assert!(recorder.ids().is_empty());
        assert!(report.processed.is_empty());
        assert!(report.error.is_none());
        assert!(recorder.store.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_reports_and_leaves_no_entry() {
        let recorder = Arc::new(Recorder::default());
        let source = Arc::new(FakeSource::failing());

        let report = worker("inbox", source, recorder.clone()).run().await;

        let error = report.error.expect("error recorded");
        assert!(error.contains("network unreachable"), "error: {error}");
        assert!(recorder.ids().is_empty());
        assert!(recorder.store.is_empty());
    }

    #[tokio::test]
    async fn sentinel_items_are_never_processed() {
        let recorder = Arc::new(Recorder::default());
        let source = Arc::new(FakeSource::new(vec![
            item("in/*done", 1),
            item("in/new", 2),
            item("*old", 0),
        ]));

        let report = worker("inbox", source, recorder.clone()).run().await;
        assert_eq!(report.processed, vec!["in/new"]);
    }

    #[tokio::test]
    async fn successful_items_are_marked_when_enabled() {
        let recorder = Arc::new(Recorder {
            fail_on: ["b".to_string()].into_iter().collect(),
            ..Recorder::default()
        });
        let source = Arc::new(FakeSource::new(vec![item("a", 1), item("b", 2)]));

        worker("inbox", source.clone(), recorder)
            .mark_processed(true)
            .run()
            .await;

        assert_eq!(*source.marked.lock().expect("lock"), vec!["a".to_string()]);
    }
}

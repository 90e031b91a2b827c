//! Fork-join over every configured directory.
//!
//! One task per directory, all started before any is awaited. There is no
//! cap on how many run at once, no retry and no cross-directory backpressure.

use std::sync::Arc;

use conductor_core::DirectoryName;
use conductor_source::WorkSource;

use crate::process::ItemProcessor;
use crate::store::StatusStore;
use crate::worker::{DirectoryReport, DirectoryWorker};

/// Everything needed to start one directory's worker.
pub struct DirectoryJob {
    pub name: DirectoryName,
    pub source: Arc<dyn WorkSource>,
    pub processor: Arc<dyn ItemProcessor>,
    pub mark_processed: bool,
}

/// Run every job concurrently and wait for all of them. Reports come back in
/// job order; a worker that panics is reported with an error rather than
/// taking its siblings down.
pub async fn run_all(jobs: Vec<DirectoryJob>, store: &StatusStore) -> Vec<DirectoryReport> {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let worker = DirectoryWorker::new(
                job.name.clone(),
                job.source,
                job.processor,
                store.clone(),
            )
            .mark_processed(job.mark_processed);
            (job.name, tokio::spawn(worker.run()))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        let report = match handle.await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(directory = %name, error = %err, "directory worker aborted");
                DirectoryReport {
                    error: Some(format!("worker task failed: {err}")),
                    ..DirectoryReport::new(&name)
                }
            }
        };
        reports.push(report);
    }
    reports
}

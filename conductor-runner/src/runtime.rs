use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use conductor_core::{config, Settings};
use conductor_source::{Source, WorkSource};

use crate::error::{io_err, RunnerError};
use crate::lock::InstanceLock;
use crate::paths::socket_path;
use crate::pool::{self, DirectoryJob};
use crate::process::{CommandProcessor, ItemProcessor};
use crate::server::StatusServer;
use crate::store::StatusStore;
use crate::worker::DirectoryReport;

/// How `conductor run` was invoked.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_path: PathBuf,
    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub directories: Vec<DirectoryReport>,
    pub processed: usize,
    pub failed: usize,
    pub duration_ms: u128,
}

impl RunSummary {
    fn new(directories: Vec<DirectoryReport>, started: Instant) -> Self {
        let processed = directories.iter().map(|d| d.processed.len()).sum();
        let failed = directories.iter().map(|d| d.failed.len()).sum();
        Self {
            directories,
            processed,
            failed,
            duration_ms: started.elapsed().as_millis(),
        }
    }
}

/// Install logging, build a multi-threaded runtime and run to completion.
///
/// `runtime_root` holds the instance lock and the status socket; it is
/// host-wide, see [`crate::paths::runtime_root`].
pub fn start_blocking(
    runtime_root: &Path,
    options: &RunOptions,
) -> Result<RunSummary, RunnerError> {
    init_tracing(options.json_logs);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(runtime_root.to_path_buf(), options.config_path.clone()))
}

/// One complete run: lock, configuration, status server, every directory.
///
/// The lock and the status socket are released on every exit path,
/// including errors after they were acquired.
pub async fn run(runtime_root: PathBuf, config_path: PathBuf) -> Result<RunSummary, RunnerError> {
    let started = Instant::now();
    let lock = InstanceLock::acquire_at(&runtime_root)?;

    let settings = config::load_at(&config_path)?;
    tracing::info!(
        config = %config_path.display(),
        directories = settings.directories.len(),
        "configuration loaded",
    );

    let store = StatusStore::new();
    let server = StatusServer::bind(&socket_path(&runtime_root), store.clone())?;

    let jobs = build_jobs(&settings).await;
    let reports = pool::run_all(jobs, &store).await;
    server.shutdown().await;
    drop(lock);

    let summary = RunSummary::new(reports, started);
    for report in &summary.directories {
        match &report.error {
            Some(error) => tracing::error!(
                directory = %report.directory,
                error = %error,
                "directory did not complete",
            ),
            None => tracing::info!(
                directory = %report.directory,
                processed = report.processed.len(),
                failed = report.failed.len(),
                "directory summary",
            ),
        }
    }
    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        duration_ms = summary.duration_ms,
        "all directories processed",
    );
    Ok(summary)
}

async fn build_jobs(settings: &Settings) -> Vec<DirectoryJob> {
    let sources = Source::resolve_all(&settings.directories, &settings.s3).await;
    settings
        .directories
        .iter()
        .zip(sources)
        .map(|(dir, source)| {
            let source: Arc<dyn WorkSource> = Arc::new(source);
            let processor: Arc<dyn ItemProcessor> =
                Arc::new(CommandProcessor::new(dir.process.clone()));
            DirectoryJob {
                name: dir.name.clone(),
                source,
                processor,
                mark_processed: dir.mark_processed,
            }
        })
        .collect()
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

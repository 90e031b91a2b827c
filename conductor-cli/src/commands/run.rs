//! `conductor run`: one pass over every configured directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use conductor_core::config;
use conductor_runner::{paths, start_blocking, RunOptions, RunSummary};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Configuration file. Defaults to ~/.conductor/config.json.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Print the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => config::default_config_path()?,
        };
        let options = RunOptions {
            config_path,
            json_logs: self.json_logs,
        };

        let summary = start_blocking(&paths::runtime_root(), &options)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize summary")?
            );
        } else {
            print_summary(&summary);
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary) {
    for report in &summary.directories {
        let marker = match (&report.error, report.failed.is_empty()) {
            (Some(_), _) => "✗".red().bold(),
            (None, false) => "!".yellow().bold(),
            (None, true) => "✓".green().bold(),
        };
        let detail = match &report.error {
            Some(error) => error.clone(),
            None => format!(
                "{} processed, {} failed",
                report.processed.len(),
                report.failed.len()
            ),
        };
        println!("{marker} {}: {detail}", report.directory.bold());
    }
    println!(
        "{} directories | {} processed | {} failed | {} ms",
        summary.directories.len(),
        summary.processed,
        summary.failed,
        summary.duration_ms,
    );
}

//! `conductor status`: query the running instance over its local socket.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use conductor_runner::{paths, request_status, StatusDocument};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the raw status document.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let document =
            request_status(&paths::runtime_root()).context("failed to query conductor status")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&document).context("failed to serialize status")?
            );
            return Ok(());
        }

        print_table(document);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "directory")]
    directory: String,
    #[tabled(rename = "current")]
    current: String,
    #[tabled(rename = "pending")]
    pending: usize,
    #[tabled(rename = "next")]
    next: String,
}

fn print_table(document: StatusDocument) {
    if document.is_empty() {
        println!("Conductor is running; no directory is in progress.");
        return;
    }

    let pending: usize = document.values().map(|entry| entry.pendientes.len()).sum();
    println!(
        "{} | {} directories | {} pending",
        "Conductor".bold(),
        document.len(),
        pending,
    );

    let rows: Vec<StatusRow> = document
        .into_iter()
        .map(|(directory, entry)| StatusRow {
            directory,
            current: if entry.actual.is_empty() {
                "-".to_string()
            } else {
                entry.actual
            },
            pending: entry.pendientes.len(),
            next: entry.pendientes.first().cloned().unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

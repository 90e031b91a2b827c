//! Conductor: drain several work directories in parallel, one item at a time.
//!
//! # Usage
//!
//! ```text
//! conductor run [--config <path>] [--json-logs]
//! conductor status [--json]
//! ```

mod commands;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{run::RunArgs, status::StatusArgs};
use conductor_runner::RunnerError;

#[derive(Parser, Debug)]
#[command(
    name = "conductor",
    version,
    about = "Process configured work directories, oldest item first",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process every configured directory once, then exit.
    Run(RunArgs),

    /// Ask the running instance what it is working on.
    Status(StatusArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result: Result<()> = match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

/// `2` when another instance holds the lock, `1` for everything else.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<RunnerError>() {
        Some(RunnerError::AlreadyRunning { .. }) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}

//! hdir-ingest - dry-run a hospital CSV upload from disk

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hdir_common::logging::{init_logging, LogConfig, LogLevel};
use hdir_ingest::{dry_run, InterpretOptions, DEFAULT_MAX_ROWS};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hdir-ingest")]
#[command(author, version, about = "Hospital directory upload tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interpret and validate a CSV file, printing the report as JSON
    Validate {
        /// CSV file to check
        file: PathBuf,

        /// Maximum rows accepted per upload
        #[arg(long, env = "MAX_CSV_ROWS", default_value_t = DEFAULT_MAX_ROWS)]
        max_rows: usize,

        /// Reject the file when a headerless row has fewer than two columns
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("hdir-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Validate {
            file,
            max_rows,
            strict,
        } => {
            info!(file = %file.display(), "Validating upload");
            let raw = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let options = InterpretOptions {
                max_rows,
                strict_columns: strict,
            };
            let report = dry_run(&raw, options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
    }

    Ok(())
}

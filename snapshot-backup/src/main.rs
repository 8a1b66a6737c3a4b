//! Snapshot Backup - Main entry point
//!
//! Runs a single backup pass: scan, compare, snapshot on change, prune.

use anyhow::Result;
use clap::Parser;
use snapshot_backup::{utils, BackupExecutor, BackupJob, Config};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source directory to back up
    #[arg(short, long, value_name = "DIR")]
    source: Option<PathBuf>,

    /// Destination root for manifests and snapshots
    #[arg(short, long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Maximum number of snapshots to keep
    #[arg(short, long, value_name = "COUNT")]
    max_snapshots: Option<usize>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    // Command-line flags win over the file
    if let Some(source) = args.source {
        config.backup.source = Some(source);
    }
    if let Some(destination) = args.destination {
        config.backup.destination = destination;
    }
    if let Some(max) = args.max_snapshots {
        config.backup.max_snapshots = max;
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::info!("Starting snapshot-backup v{}", env!("CARGO_PKG_VERSION"));

    let job = BackupJob::from_config(&config)?;
    let result = BackupExecutor::new(job).execute()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    if let Some(err) = &result.retention_error {
        tracing::warn!("Old snapshots could not all be removed: {}", err);
    }

    Ok(())
}

//! Backup command: incremental sync of a drive into an instrument folder.

use super::{load_config, setup_logging};
use anyhow::{Context, Result};
use clap::Args;
use seqarchive_core::{SelectiveCopier, TreeDiffer};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Arguments for the backup command
#[derive(Args)]
pub struct BackupArgs {
    /// Root of the drive to copy from
    pub input_path: PathBuf,

    /// Target instrument folder, as named in the config `instruments` map
    #[arg(long, value_name = "NAME")]
    pub instrument: String,

    /// Only report what would be copied
    #[arg(long)]
    pub check: bool,

    /// Walk through the copy without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Also write the change set as JSON
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

/// Run the backup command
pub fn run(args: BackupArgs, config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let destination = config.instrument_destination(&args.instrument)?.to_path_buf();
    setup_logging(&config, verbose, &args.instrument)?;

    info!("Input path: {}", args.input_path.display());
    info!("Instrument: {}", args.instrument);
    info!("Destination path: {}", destination.display());
    if args.check {
        warn!("Running --check; files will not be copied!");
    }

    let differ = TreeDiffer::new().with_exclude_patterns(&config.exclude)?;
    let changes = differ.diff(&args.input_path, &destination).map_err(|e| {
        error!("Critical error when trying to identify changes between directories: {}", e);
        e
    })?;

    if let Some(json_path) = &args.json {
        let json = serde_json::to_string_pretty(&changes)?;
        std::fs::write(json_path, json)
            .with_context(|| format!("Failed to write {}", json_path.display()))?;
        info!("Change set written to {}", json_path.display());
    }

    if args.check {
        println!(
            "Check completed: {} new path(s) ({} folder(s), {} file(s)), {} modified file(s)",
            changes.summary.total_new(),
            changes.summary.new_dirs,
            changes.summary.new_files,
            changes.summary.updated
        );
        return Ok(());
    }

    let copier = SelectiveCopier::new().dry_run(args.dry_run);
    let outcome = copier.copy_selected(&args.input_path, &destination, &changes.new_files);

    println!("Backup completed!");
    println!("=================");
    println!("Copied:          {}", outcome.succeeded);
    println!("Modified (kept): {}", changes.summary.updated);
    if !outcome.is_complete() {
        println!("Failed:          {}", outcome.failed.len());
        for failure in &outcome.failed {
            println!("  - {} ({})", failure.path.display(), failure.error);
        }
    }

    Ok(())
}

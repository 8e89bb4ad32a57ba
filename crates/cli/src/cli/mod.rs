//! Command-line interface for seqarchive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seqarchive_core::logging::{init_logging, log_file_path};
use seqarchive_core::ArchiveConfig;
use std::path::{Path, PathBuf};

pub mod archive;
pub mod backup;

/// seqarchive - instrument drive backup and NGS run archival
#[derive(Parser)]
#[command(name = "seqarchive")]
#[command(about = "Incremental instrument-drive backup and integrity-checked NGS run archival")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (default: <config dir>/seqarchive/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Copy new files from a drive into an instrument's archive folder
    Backup(backup::BackupArgs),
    /// Run QC on an NGS run and archive it with checksum verification
    Archive(archive::ArchiveArgs),
}

pub(crate) fn load_config(path: Option<&Path>) -> Result<ArchiveConfig> {
    let config = ArchiveConfig::load(path).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Console logging plus, when `log_output` is configured, a per-run file.
pub(crate) fn setup_logging(config: &ArchiveConfig, verbose: bool, label: &str) -> Result<()> {
    let log_file = config
        .log_output
        .as_deref()
        .map(|dir| log_file_path(dir, label));
    init_logging(verbose, log_file.as_deref()).context("Failed to initialise logging")?;
    Ok(())
}

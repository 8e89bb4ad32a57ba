//! Archive command: QC an NGS run and copy it to the archive root.

use super::{load_config, setup_logging};
use anyhow::Result;
use clap::Args;
use seqarchive_core::qc::QcStage;
use seqarchive_core::run::resolve_run_dir;
use seqarchive_core::{ArchiveError, IntegrityVerdict, RunArchiver};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Arguments for the archive command
#[derive(Args)]
pub struct ArchiveArgs {
    /// NGS run directory ({date}-{run}_{information})
    #[arg(short = 'z', long = "z-drive", value_name = "PATH")]
    pub run_dir: PathBuf,

    /// Archive destination (default: archive.default_destination from config)
    #[arg(short, long, value_name = "PATH")]
    pub dest: Option<PathBuf>,

    /// Treat the run as a name under archive.raw_data_root
    #[arg(short = 'R', long)]
    pub resolve: bool,

    /// Don't run tools or copy any files
    #[arg(short = 'D', long)]
    pub dry_run: bool,

    /// Skip fastqc/multiqc
    #[arg(long)]
    pub skip_qc: bool,

    /// Show progress from fastqc
    #[arg(long)]
    pub show_fastqc: bool,

    /// Show progress from multiqc
    #[arg(long)]
    pub show_multiqc: bool,

    /// Threads for fastqc (default: archive.threads from config)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,
}

/// Run the archive command
pub fn run(args: ArchiveArgs, config_path: Option<&Path>, verbose: bool) -> Result<()> {
    let config = load_config(config_path)?;

    let run_dir = if args.resolve {
        resolve_run_dir(&config.archive.raw_data_root, &args.run_dir)?
    } else if args.run_dir.is_dir() {
        args.run_dir.clone()
    } else {
        return Err(ArchiveError::NotFound { path: args.run_dir }.into());
    };
    let dest = args
        .dest
        .clone()
        .unwrap_or_else(|| config.archive.default_destination.clone());

    let label = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "archive".to_string());
    setup_logging(&config, verbose, &label)?;

    let mut archiver = RunArchiver::new().dry_run(args.dry_run);
    if !args.skip_qc {
        let threads = args.threads.unwrap_or(config.archive.threads);
        archiver = archiver.with_qc(
            QcStage::new(threads)
                .dry_run(args.dry_run)
                .show_output(args.show_fastqc, args.show_multiqc),
        );
    }

    let report = archiver.archive(&run_dir, &dest).map_err(|e| {
        error!("Critical error when archiving {}: {}", run_dir.display(), e);
        e
    })?;

    if report.skipped {
        println!("Archive skipped: {} already exists", report.destination.display());
        return Ok(());
    }

    info!("BACKUP COMPLETE !");
    println!("Archive completed!");
    println!("==================");
    println!("Run:          {}", report.run_name);
    println!("Destination:  {}", report.destination.display());
    println!("Entries:      {}", report.transferred);
    if let Some(qc) = &report.qc {
        println!(
            "QC:           fastqc {}, multiqc {}",
            if qc.fastqc_ran { "ran" } else { "already present" },
            if qc.multiqc_ran { "ran" } else { "already present" }
        );
    }
    match report.verdict {
        IntegrityVerdict::Verified { files } => println!("Checksums:    {} file(s) verified", files),
        IntegrityVerdict::NotChecked => println!("Checksums:    not checked (dry run)"),
    }

    Ok(())
}

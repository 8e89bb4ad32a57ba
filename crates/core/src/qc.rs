//! Quality-control stage run inside a sequencing run directory before it
//! is archived. Tools run synchronously, one after the other.

use crate::logging::current_dispatch;
use crate::run::{find_fastq_dir, find_instrument_output, list_fastq_files};
use crate::{ArchiveError, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn, Dispatch};

pub const FASTQC: &str = "fastqc";
pub const MULTIQC: &str = "multiqc";
pub const QC_TOOLS: [&str; 2] = [FASTQC, MULTIQC];

/// Fail with `DependencyMissing` for the first tool not found on `PATH`.
pub fn require_tools(tools: &[&str]) -> Result<Vec<PathBuf>> {
    tools
        .iter()
        .map(|tool| {
            which::which(tool).map_err(|_| ArchiveError::DependencyMissing {
                tool: tool.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QcReport {
    pub fastqc_ran: bool,
    pub multiqc_ran: bool,
}

pub struct QcStage {
    threads: usize,
    dry_run: bool,
    show_fastqc: bool,
    show_multiqc: bool,
    dispatch: Dispatch,
}

impl QcStage {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
            dry_run: false,
            show_fastqc: false,
            show_multiqc: false,
            dispatch: current_dispatch(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Stream tool output to the console instead of discarding it.
    pub fn show_output(mut self, fastqc: bool, multiqc: bool) -> Self {
        self.show_fastqc = fastqc;
        self.show_multiqc = multiqc;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn run(&self, run_dir: &Path) -> Result<QcReport> {
        tracing::dispatcher::with_default(&self.dispatch, || self.run_stage(run_dir))
    }

    fn run_stage(&self, run_dir: &Path) -> Result<QcReport> {
        let analysis_dir = run_dir.join("analysis");
        let fastqc_dir = analysis_dir.join("fastqc");
        let mut report = QcReport::default();

        info!("Checking directory structure ...");
        if fastqc_dir.exists() {
            warn!("Analysis directory exists!");
        } else {
            if !self.dry_run {
                fs::create_dir_all(&fastqc_dir).map_err(|e| ArchiveError::from_io(&fastqc_dir, e))?;
            }
            info!("Created directory structure.");
        }

        info!("Checking fastqc analysis ...");
        if has_html_report(&fastqc_dir)? {
            warn!("Fastqc analysis already exists!");
        } else {
            let output_dir = find_instrument_output(run_dir)?;
            let fastq_dir = find_fastq_dir(&output_dir)?;
            let fastq_files = list_fastq_files(&fastq_dir)?;
            debug!("Found {} files to process in {}.", fastq_files.len(), fastq_dir.display());
            info!("Running fastqc using {} threads ...", self.threads);

            let mut args: Vec<OsString> = vec![
                "-t".into(),
                self.threads.to_string().into(),
                "-o".into(),
                fastqc_dir.clone().into_os_string(),
            ];
            args.extend(fastq_files.into_iter().map(PathBuf::into_os_string));
            self.invoke(FASTQC, &args, self.show_fastqc)?;

            report.fastqc_ran = true;
            info!("Performed fastqc analysis!");
        }

        info!("Checking multiqc analysis ...");
        let multiqc_html = analysis_dir.join("multiqc.html");
        if multiqc_html.exists() {
            warn!("Multiqc analysis already exists!");
        } else {
            info!("Running multiqc on fastqc analysis dir: {} ...", fastqc_dir.display());
            let args: Vec<OsString> = vec![
                fastqc_dir.clone().into_os_string(),
                "--interactive".into(),
                "--outdir".into(),
                analysis_dir.clone().into_os_string(),
                "--filename".into(),
                "multiqc.html".into(),
            ];
            self.invoke(MULTIQC, &args, self.show_multiqc)?;
            self.publish_multiqc(run_dir, &multiqc_html)?;

            report.multiqc_ran = true;
            info!("Performed multiqc analysis!");
        }

        Ok(report)
    }

    /// Copy the multiqc report to `<run>/<run-name>.html`.
    fn publish_multiqc(&self, run_dir: &Path, multiqc_html: &Path) -> Result<()> {
        let run_name = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        let published = run_dir.join(format!("{}.html", run_name));

        if self.dry_run {
            debug!("Would copy {} to {}", multiqc_html.display(), published.display());
            return Ok(());
        }
        fs::copy(multiqc_html, &published).map_err(|e| ArchiveError::from_io(multiqc_html, e))?;
        Ok(())
    }

    fn invoke(&self, tool: &str, args: &[OsString], show_output: bool) -> Result<()> {
        debug!("{} {:?}", tool, args);
        if self.dry_run {
            return Ok(());
        }

        let (stdout, stderr) = if show_output {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let status = Command::new(tool)
            .args(args)
            .stdout(stdout)
            .stderr(stderr)
            .status()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => ArchiveError::DependencyMissing {
                    tool: tool.to_string(),
                },
                _ => ArchiveError::ToolFailed {
                    tool: tool.to_string(),
                    status: e.to_string(),
                },
            })?;

        if !status.success() {
            return Err(ArchiveError::ToolFailed {
                tool: tool.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

fn has_html_report(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir).map_err(|e| ArchiveError::from_io(dir, e))? {
        let path = entry.map_err(|e| ArchiveError::from_io(dir, e))?.path();
        if path.extension().map_or(false, |ext| ext == "html") {
            return Ok(true);
        }
    }
    Ok(false)
}

//! Whole-run archival: copy a run directory into the archive root and gate
//! the result on matching checksum manifests.

use crate::copier::SelectiveCopier;
use crate::differ::TreeDiffer;
use crate::logging::current_dispatch;
use crate::manifest::{self, ChecksumManifest, IntegrityVerdict};
use crate::qc::{require_tools, QcReport, QcStage, QC_TOOLS};
use crate::{ArchiveError, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, info_span, warn, Dispatch};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub run_name: String,
    pub destination: PathBuf,
    /// The destination already held this run; nothing was copied.
    pub skipped: bool,
    pub dry_run: bool,
    pub transferred: usize,
    pub verdict: IntegrityVerdict,
    /// `None` when the QC stage was not configured.
    pub qc: Option<QcReport>,
}

pub struct RunArchiver {
    dry_run: bool,
    qc: Option<QcStage>,
    dispatch: Dispatch,
}

impl Default for RunArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunArchiver {
    pub fn new() -> Self {
        Self {
            dry_run: false,
            qc: None,
            dispatch: current_dispatch(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run QC inside the run directory before copying it.
    pub fn with_qc(mut self, qc: QcStage) -> Self {
        self.qc = Some(qc);
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn archive(&self, run_dir: &Path, archive_root: &Path) -> Result<ArchiveReport> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let span = info_span!("archive", run = %run_dir.display());
            let _enter = span.enter();
            self.archive_run(run_dir, archive_root)
        })
    }

    fn archive_run(&self, run_dir: &Path, archive_root: &Path) -> Result<ArchiveReport> {
        if !run_dir.is_dir() {
            return Err(ArchiveError::NotFound {
                path: run_dir.to_path_buf(),
            });
        }
        info!("Found directory: '{}'.", run_dir.display());

        let run_name = run_dir
            .canonicalize()
            .map_err(|e| ArchiveError::from_io(run_dir, e))?
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ArchiveError::NotFound {
                path: run_dir.to_path_buf(),
            })?;

        let qc = match &self.qc {
            Some(stage) => {
                require_tools(&QC_TOOLS)?;
                Some(stage.run(run_dir)?)
            }
            None => None,
        };

        let destination = archive_root.join(&run_name);
        let mut report = ArchiveReport {
            run_name,
            destination: destination.clone(),
            skipped: false,
            dry_run: self.dry_run,
            transferred: 0,
            verdict: IntegrityVerdict::NotChecked,
            qc,
        };

        info!(
            "Checking destination {} for {} ...",
            archive_root.display(),
            report.run_name
        );
        if destination.exists() {
            warn!("Destination {} already exists!", destination.display());
            report.skipped = true;
            return Ok(report);
        }
        if !archive_root.is_dir() {
            return Err(ArchiveError::NotFound {
                path: archive_root.to_path_buf(),
            });
        }

        info!("Copying {} to {} ...", run_dir.display(), archive_root.display());
        if self.dry_run {
            return Ok(report);
        }

        fs::create_dir(&destination).map_err(|e| ArchiveError::from_io(&destination, e))?;
        let changes = TreeDiffer::new()
            .with_dispatch(self.dispatch.clone())
            .diff(run_dir, &destination)?;
        let outcome = SelectiveCopier::new()
            .with_dispatch(self.dispatch.clone())
            .copy_selected(run_dir, &destination, &changes.new_files);
        report.transferred = outcome.into_result().map_err(|e| {
            error!("Archive of {} is incomplete: {}", report.run_name, e);
            e
        })?;
        info!("Copied {} to {}!", run_dir.display(), archive_root.display());

        report.verdict = self.verify(run_dir, &destination)?;
        Ok(report)
    }

    fn verify(&self, run_dir: &Path, destination: &Path) -> Result<IntegrityVerdict> {
        info!("Verifying checksums ...");
        let source_manifest = ChecksumManifest::compute(run_dir)?;
        let dest_manifest = ChecksumManifest::compute(destination)?;
        source_manifest.write_to(run_dir)?;
        dest_manifest.write_to(destination)?;

        match manifest::verify(&source_manifest, &dest_manifest) {
            Ok(verdict) => {
                info!("Checksums match for {} file(s).", source_manifest.len());
                Ok(verdict)
            }
            Err(e) => {
                error!("Checksum verification failed for {}: {}", destination.display(), e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MANIFEST_FILE_NAME;
    use tempfile::TempDir;

    fn sample_run(root: &Path) -> PathBuf {
        let run = root.join("raw").join("20240115-run42_amplicons");
        let calls = run.join("240115_M01234_0123_000000000-ABCDE/Data/Intensities/BaseCalls");
        fs::create_dir_all(&calls).unwrap();
        fs::write(calls.join("S1_R1_001.fastq.gz"), b"@r\nACGT\n+\nIIII\n").unwrap();
        fs::write(run.join("SampleSheet.csv"), b"[Header]\n").unwrap();
        run
    }

    #[test]
    fn test_archive_copies_and_verifies() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let run = sample_run(temp_dir.path());
        let archive_root = temp_dir.path().join("archive");
        fs::create_dir_all(&archive_root).unwrap();

        let report = RunArchiver::new().archive(&run, &archive_root)?;

        assert!(!report.skipped);
        assert_eq!(report.verdict, IntegrityVerdict::Verified { files: 2 });
        let dest = archive_root.join("20240115-run42_amplicons");
        assert_eq!(report.destination, dest);
        assert!(dest.join("SampleSheet.csv").is_file());
        assert_eq!(
            fs::read_to_string(dest.join(MANIFEST_FILE_NAME)).unwrap(),
            fs::read_to_string(run.join(MANIFEST_FILE_NAME)).unwrap()
        );
        Ok(())
    }

    #[test]
    fn test_existing_destination_is_skipped() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let run = sample_run(temp_dir.path());
        let archive_root = temp_dir.path().join("archive");
        fs::create_dir_all(archive_root.join("20240115-run42_amplicons")).unwrap();

        let report = RunArchiver::new().archive(&run, &archive_root)?;

        assert!(report.skipped);
        assert_eq!(report.verdict, IntegrityVerdict::NotChecked);
        assert!(!archive_root
            .join("20240115-run42_amplicons/SampleSheet.csv")
            .exists());
        Ok(())
    }

    #[test]
    fn test_dry_run_writes_nothing() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let run = sample_run(temp_dir.path());
        let archive_root = temp_dir.path().join("archive");
        fs::create_dir_all(&archive_root).unwrap();

        let report = RunArchiver::new().dry_run(true).archive(&run, &archive_root)?;

        assert!(report.dry_run);
        assert!(!archive_root.join("20240115-run42_amplicons").exists());
        assert!(!run.join(MANIFEST_FILE_NAME).exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_uncopyable_entry_fails_the_archive() {
        let temp_dir = TempDir::new().unwrap();
        let run = sample_run(temp_dir.path());
        std::os::unix::fs::symlink(run.join("SampleSheet.csv"), run.join("latest.csv")).unwrap();
        let archive_root = temp_dir.path().join("archive");
        fs::create_dir_all(&archive_root).unwrap();

        match RunArchiver::new().archive(&run, &archive_root) {
            Err(ArchiveError::PartialTransferFailure { failed, .. }) => {
                assert_eq!(failed, vec![PathBuf::from("latest.csv")]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        let dest = archive_root.join("20240115-run42_amplicons");
        assert!(fs::symlink_metadata(dest.join("latest.csv")).is_err());
        assert!(!dest.join(MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn test_missing_archive_root() {
        let temp_dir = TempDir::new().unwrap();
        let run = sample_run(temp_dir.path());

        assert!(matches!(
            RunArchiver::new().archive(&run, &temp_dir.path().join("nowhere")),
            Err(ArchiveError::NotFound { .. })
        ));
    }
}

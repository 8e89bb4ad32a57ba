//! Copies the `new` entries of a diff into the destination tree.
//!
//! Entries are processed one at a time, in the order given. A failing entry
//! is recorded and skipped; it never aborts the pass.

use crate::logging::current_dispatch;
use crate::{ArchiveError, Result};
use filetime::FileTime;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, info_span, warn, Dispatch};

#[derive(Debug)]
pub struct FailedTransfer {
    pub path: PathBuf,
    pub error: ArchiveError,
}

#[derive(Debug, Default)]
pub struct TransferOutcome {
    pub succeeded: usize,
    pub failed: Vec<FailedTransfer>,
}

impl TransferOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_paths(&self) -> Vec<PathBuf> {
        self.failed.iter().map(|f| f.path.clone()).collect()
    }

    /// Success count, or `PartialTransferFailure` when anything failed.
    pub fn into_result(self) -> Result<usize> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(ArchiveError::PartialTransferFailure {
                failed: self.failed.into_iter().map(|f| f.path).collect(),
                succeeded: self.succeeded,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopiedKind {
    File,
    Directory,
}

pub struct SelectiveCopier {
    dry_run: bool,
    dispatch: Dispatch,
}

impl Default for SelectiveCopier {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectiveCopier {
    pub fn new() -> Self {
        Self {
            dry_run: false,
            dispatch: current_dispatch(),
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Copy each relative entry from `source_root` to `dest_root`.
    pub fn copy_selected(
        &self,
        source_root: &Path,
        dest_root: &Path,
        entries: &[PathBuf],
    ) -> TransferOutcome {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let span = info_span!("copy", dest = %dest_root.display(), dry_run = self.dry_run);
            let _enter = span.enter();

            info!("Starting backup ...");
            let mut outcome = TransferOutcome::default();

            for relative in entries {
                info!("Copying {} ...", relative.display());
                match self.copy_entry(source_root, dest_root, relative) {
                    Ok(_) => {
                        info!("Successfully copied {} .", relative.display());
                        outcome.succeeded += 1;
                    }
                    Err(error) => {
                        warn!("Error occurred trying to copy {}: {}", relative.display(), error);
                        outcome.failed.push(FailedTransfer {
                            path: relative.clone(),
                            error,
                        });
                    }
                }
            }

            log_outcome(&outcome);
            outcome
        })
    }

    /// Copy a single entry. Never overwrites an existing destination path.
    pub fn copy_entry(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: &Path,
    ) -> Result<CopiedKind> {
        let source = source_root.join(relative);
        let dest = dest_root.join(relative);

        let meta = fs::symlink_metadata(&source).map_err(|e| ArchiveError::from_io(&source, e))?;
        match fs::symlink_metadata(&dest) {
            Ok(_) => return Err(ArchiveError::DestinationExists { path: dest }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ArchiveError::from_io(&dest, e)),
        }

        let file_type = meta.file_type();
        if file_type.is_file() {
            if !self.dry_run {
                copy_file_with_metadata(&source, &dest, &meta)?;
            }
            Ok(CopiedKind::File)
        } else if file_type.is_dir() {
            // Children arrive later in the list; only this level is created.
            if !self.dry_run {
                fs::create_dir(&dest).map_err(|e| ArchiveError::from_io(&dest, e))?;
            }
            Ok(CopiedKind::Directory)
        } else {
            Err(ArchiveError::UnsupportedEntry { path: source })
        }
    }
}

/// Copy bytes into a freshly created file, then carry over permission bits
/// and access/modification times.
fn copy_file_with_metadata(source: &Path, dest: &Path, meta: &fs::Metadata) -> Result<()> {
    let mut reader = File::open(source).map_err(|e| ArchiveError::from_io(source, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| ArchiveError::from_io(dest, e))?;

    io::copy(&mut reader, &mut writer).map_err(|e| ArchiveError::from_io(dest, e))?;
    writer.sync_all().map_err(|e| ArchiveError::from_io(dest, e))?;
    drop(writer);

    fs::set_permissions(dest, meta.permissions()).map_err(|e| ArchiveError::from_io(dest, e))?;
    filetime::set_file_times(
        dest,
        FileTime::from_last_access_time(meta),
        FileTime::from_last_modification_time(meta),
    )
    .map_err(|e| ArchiveError::from_io(dest, e))?;

    Ok(())
}

fn log_outcome(outcome: &TransferOutcome) {
    if outcome.failed.is_empty() {
        info!("Backup finished. Successfully copied {} file(s).", outcome.succeeded);
        return;
    }

    warn!(
        "Backup finished. Successfully copied {} file(s); {} file(s) failed:",
        outcome.succeeded,
        outcome.failed.len()
    );
    for failure in &outcome.failed {
        warn!("\t{}", failure.path.display());
    }
}

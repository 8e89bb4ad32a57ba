//! Source/destination tree comparison for incremental backups.
//!
//! Every entry under the source root is classified against the destination
//! root as new, updated or unchanged. The differ never writes.

use crate::logging::current_dispatch;
use crate::{ArchiveError, Result};
use filetime::FileTime;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, Dispatch};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub new_files: usize,
    pub new_dirs: usize,
    /// New entries that are neither regular files nor directories.
    pub new_other: usize,
    pub updated: usize,
}

impl DiffSummary {
    pub fn total_new(&self) -> usize {
        self.new_files + self.new_dirs + self.new_other
    }
}

/// Result of one diff pass. Both lists hold paths relative to the roots,
/// sorted so that a directory always precedes its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub new_files: Vec<PathBuf>,
    pub updated_files: Vec<PathBuf>,
    pub summary: DiffSummary,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.updated_files.is_empty()
    }
}

pub struct TreeDiffer {
    exclude: Option<GlobSet>,
    dispatch: Dispatch,
}

impl Default for TreeDiffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeDiffer {
    pub fn new() -> Self {
        Self {
            exclude: None,
            dispatch: current_dispatch(),
        }
    }

    /// Skip relative paths matching any of `patterns` (and everything below them).
    pub fn with_exclude_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            self.exclude = None;
            return Ok(self);
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref()).map_err(|e| {
                ArchiveError::Config(format!("Invalid exclude pattern '{}': {}", pattern.as_ref(), e))
            })?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| ArchiveError::Config(format!("Invalid exclude patterns: {}", e)))?;

        self.exclude = Some(set);
        Ok(self)
    }

    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Classify every entry under `source_root` against `dest_root`.
    pub fn diff(&self, source_root: &Path, dest_root: &Path) -> Result<ChangeSet> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let span = info_span!("diff", source = %source_root.display());
            let _enter = span.enter();
            self.diff_trees(source_root, dest_root)
        })
    }

    fn diff_trees(&self, source_root: &Path, dest_root: &Path) -> Result<ChangeSet> {
        let source = require_dir(source_root)?;
        require_dir(dest_root)?;

        let mut changes = ChangeSet::default();
        let mut walker = WalkDir::new(&source)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = walker.next() {
            let entry = entry.map_err(ArchiveError::from_walk)?;
            let is_dir = entry.file_type().is_dir();

            // The walk root is canonical, so every yielded path sits under it.
            let relative = match entry.path().strip_prefix(&source) {
                Ok(relative) => relative.to_path_buf(),
                Err(_) => continue,
            };

            if self.is_excluded(&relative) {
                debug!("Excluding {}", relative.display());
                if is_dir {
                    walker.skip_current_dir();
                }
                continue;
            }

            let dest_meta = match lookup_destination(dest_root, &relative)? {
                Some(meta) => meta,
                None => {
                    if is_dir {
                        changes.summary.new_dirs += 1;
                    } else if entry.file_type().is_file() {
                        changes.summary.new_files += 1;
                    } else {
                        changes.summary.new_other += 1;
                    }
                    changes.new_files.push(relative);
                    continue;
                }
            };

            if entry.file_type().is_file() {
                let source_meta = entry.metadata().map_err(ArchiveError::from_walk)?;
                if modified(&source_meta) != modified(&dest_meta) {
                    changes.updated_files.push(relative);
                }
            }
        }

        changes.new_files.sort();
        changes.updated_files.sort();
        changes.summary.updated = changes.updated_files.len();

        log_changes(&changes);
        Ok(changes)
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.exclude
            .as_ref()
            .map_or(false, |set| set.is_match(relative))
    }
}

fn require_dir(root: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(root).map_err(|e| ArchiveError::from_io(root, e))?;
    if !resolved.is_dir() {
        return Err(ArchiveError::NotFound {
            path: root.to_path_buf(),
        });
    }
    Ok(resolved)
}

/// Metadata of `relative` under `dest_root`, or `None` when nothing is there.
fn lookup_destination(dest_root: &Path, relative: &Path) -> Result<Option<fs::Metadata>> {
    let dest_path = dest_root.join(relative);
    match fs::symlink_metadata(&dest_path) {
        Ok(meta) => Ok(Some(meta)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(_) if shadowed_by_non_dir(dest_root, relative) => Ok(None),
        Err(e) => Err(ArchiveError::from_io(&dest_path, e)),
    }
}

/// True when some ancestor of `relative` exists in the destination as a
/// file or symlink, so the path itself cannot exist there.
fn shadowed_by_non_dir(dest_root: &Path, relative: &Path) -> bool {
    relative
        .ancestors()
        .skip(1)
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .any(|ancestor| {
            fs::symlink_metadata(dest_root.join(ancestor)).map_or(false, |meta| !meta.is_dir())
        })
}

fn modified(meta: &fs::Metadata) -> FileTime {
    FileTime::from_last_modification_time(meta)
}

fn log_changes(changes: &ChangeSet) {
    let summary = &changes.summary;

    info!("Found {} modified file(s)", summary.updated);
    for path in &changes.updated_files {
        info!("\t{}", path.display());
    }
    if summary.updated > 0 {
        info!("These files will not be copied automatically!");
    }

    info!(
        "Found {} total new paths: {} folder(s) and {} file(s)",
        summary.total_new(),
        summary.new_dirs,
        summary.new_files
    );
    for path in &changes.new_files {
        debug!("\t{}", path.display());
    }
}

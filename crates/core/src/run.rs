//! Locating a sequencing run and the raw instrument output inside it.

use crate::{ArchiveError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Run subdirectories that never hold instrument output.
const NON_OUTPUT_DIRS: [&str; 2] = ["analysis", "docs"];

/// Resolve a run given either as a path or as a bare name under `raw_root`.
pub fn resolve_run_dir(raw_root: &Path, run: &Path) -> Result<PathBuf> {
    let run_dir = raw_root.join(run);
    if !run_dir.is_dir() {
        return Err(ArchiveError::NotFound { path: run_dir });
    }
    Ok(run_dir)
}

/// MiSeq output folders look like `240115_M01234_0123_000000000-ABCDE`:
/// four `_`-separated fields, a numeric date first, one `-` in total.
pub fn is_instrument_output_name(name: &str) -> bool {
    let fields: Vec<&str> = name.split('_').collect();
    let date = fields[0];

    fields.len() == 4
        && !date.is_empty()
        && date.chars().all(|c| c.is_ascii_digit())
        && name.matches('-').count() == 1
}

/// Find the instrument output directory among the run's immediate children.
pub fn find_instrument_output(run_dir: &Path) -> Result<PathBuf> {
    debug!("Trying to find MiSeqOutput directory in {} ...", run_dir.display());

    let mut candidates = Vec::new();
    for entry in fs::read_dir(run_dir).map_err(|e| ArchiveError::from_io(run_dir, e))? {
        let entry = entry.map_err(|e| ArchiveError::from_io(run_dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if NON_OUTPUT_DIRS.contains(&name.as_str()) {
            continue;
        }
        candidates.push((name, path));
    }
    candidates.sort();

    match candidates
        .into_iter()
        .find(|(name, _)| is_instrument_output_name(name))
    {
        Some((_, path)) => {
            debug!("Found MiSeqOutput directory: '{}'.", path.display());
            Ok(path)
        }
        None => Err(ArchiveError::NotFound {
            path: run_dir.join("<instrument output>"),
        }),
    }
}

/// Directory holding the first `*.fastq.gz` file below `output_dir`.
pub fn find_fastq_dir(output_dir: &Path) -> Result<PathBuf> {
    for entry in WalkDir::new(output_dir).sort_by_file_name() {
        let entry = entry.map_err(ArchiveError::from_walk)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(".fastq.gz") {
            if let Some(parent) = entry.path().parent() {
                debug!("Found fastq files in directory: '{}'.", parent.display());
                return Ok(parent.to_path_buf());
            }
        }
    }

    Err(ArchiveError::NotFound {
        path: output_dir.join("*.fastq.gz"),
    })
}

/// FASTQ files (compressed or not) directly inside `dir`, sorted.
pub fn list_fastq_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| ArchiveError::from_io(dir, e))? {
        let path = entry.map_err(|e| ArchiveError::from_io(dir, e))?.path();
        let is_fastq = path
            .file_name()
            .map(|n| n.to_string_lossy().contains(".fastq"))
            .unwrap_or(false);
        if is_fastq && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_instrument_output_name_rule() {
        assert!(is_instrument_output_name("240115_M01234_0123_000000000-ABCDE"));
        assert!(!is_instrument_output_name("240115_M01234_0123_000000000ABCDE"));
        assert!(!is_instrument_output_name("240115_M01234_000000000-ABCDE"));
        assert!(!is_instrument_output_name("2024a_M01234_0123_000000000-ABCDE"));
        assert!(!is_instrument_output_name("_M01234_0123_000000000-ABCDE"));
        assert!(!is_instrument_output_name("analysis"));
    }

    #[test]
    fn test_find_instrument_output() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let run = temp_dir.path().join("20240115-run42_amplicons");
        fs::create_dir_all(run.join("analysis")).unwrap();
        fs::create_dir_all(run.join("docs")).unwrap();
        fs::create_dir_all(run.join("notes_for_the-team")).unwrap();
        fs::create_dir_all(run.join("240115_M01234_0123_000000000-ABCDE")).unwrap();

        let found = find_instrument_output(&run)?;
        assert_eq!(found, run.join("240115_M01234_0123_000000000-ABCDE"));
        Ok(())
    }

    #[test]
    fn test_missing_instrument_output() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("analysis")).unwrap();

        assert!(matches!(
            find_instrument_output(temp_dir.path()),
            Err(ArchiveError::NotFound { .. })
        ));
    }

    #[test]
    fn test_find_fastq_dir_and_files() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let calls = temp_dir.path().join("Data/Intensities/BaseCalls");
        fs::create_dir_all(&calls).unwrap();
        fs::write(calls.join("S2_R1_001.fastq.gz"), b"").unwrap();
        fs::write(calls.join("S1_R1_001.fastq.gz"), b"").unwrap();
        fs::write(calls.join("SampleSheet.csv"), b"").unwrap();

        let dir = find_fastq_dir(temp_dir.path())?;
        assert_eq!(dir, calls);

        let files = list_fastq_files(&dir)?;
        assert_eq!(
            files,
            vec![calls.join("S1_R1_001.fastq.gz"), calls.join("S2_R1_001.fastq.gz")]
        );
        Ok(())
    }

    #[test]
    fn test_resolve_run_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("20240115-run42")).unwrap();

        assert!(resolve_run_dir(temp_dir.path(), Path::new("20240115-run42")).is_ok());
        assert!(matches!(
            resolve_run_dir(temp_dir.path(), Path::new("20240116-run43")),
            Err(ArchiveError::NotFound { .. })
        ));
    }
}

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Path not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Destination already exists: {}", .path.display())]
    DestinationExists { path: PathBuf },

    #[error("Unsupported entry type (not a regular file or directory): {}", .path.display())]
    UnsupportedEntry { path: PathBuf },

    #[error("{} of {} transfer(s) failed", .failed.len(), .failed.len() + .succeeded)]
    PartialTransferFailure { failed: Vec<PathBuf>, succeeded: usize },

    #[error("Checksum manifests differ in {differing} file(s)")]
    IntegrityMismatch { differing: usize },

    #[error("Required tool not found on PATH: {tool}")]
    DependencyMissing { tool: String },

    #[error("{tool} exited with {status}")]
    ToolFailed { tool: String, status: String },

    #[error("Invalid manifest: {reason}")]
    InvalidManifest { reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error at {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),
}

impl ArchiveError {
    /// Attach a path to an IO error, promoting the kinds callers branch on.
    pub fn from_io(path: impl AsRef<Path>, err: io::Error) -> Self {
        let path = path.as_ref();
        Self::promote(path, err.kind()).unwrap_or_else(|| ArchiveError::Io {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Map a walk error onto the typed variants when it wraps an IO error.
    pub fn from_walk(err: walkdir::Error) -> Self {
        let promoted = match (err.path(), err.io_error()) {
            (Some(path), Some(io_err)) => Self::promote(path, io_err.kind()),
            _ => None,
        };
        promoted.unwrap_or(ArchiveError::Walkdir(err))
    }

    fn promote(path: &Path, kind: io::ErrorKind) -> Option<Self> {
        let path = path.to_path_buf();
        match kind {
            io::ErrorKind::NotFound => Some(ArchiveError::NotFound { path }),
            io::ErrorKind::PermissionDenied => Some(ArchiveError::PermissionDenied { path }),
            io::ErrorKind::AlreadyExists => Some(ArchiveError::DestinationExists { path }),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

//! # seqarchive-core
//!
//! Incremental backup of instrument drives and integrity-checked archival
//! of sequencing runs.
//!
//! - [`differ`]: classify every path of a source tree against a destination
//!   tree as new, updated or unchanged.
//! - [`copier`]: copy the new entries one by one, recording failures
//!   without aborting.
//! - [`manifest`]: MD5 checksum manifests and the pass/fail integrity gate.
//! - [`archive`]: copy a whole run directory and verify it.
//!
//! ```rust,no_run
//! use seqarchive_core::{SelectiveCopier, TreeDiffer};
//! use std::path::Path;
//!
//! # fn main() -> seqarchive_core::Result<()> {
//! let source = Path::new("/media/usb");
//! let dest = Path::new("/mnt/Z/Raw-data/SeqStudio");
//!
//! let changes = TreeDiffer::new().diff(source, dest)?;
//! let outcome = SelectiveCopier::new().copy_selected(source, dest, &changes.new_files);
//! println!("copied {}, failed {}", outcome.succeeded, outcome.failed.len());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod copier;
pub mod differ;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod qc;
pub mod run;

pub use archive::{ArchiveReport, RunArchiver};
pub use config::ArchiveConfig;
pub use copier::{FailedTransfer, SelectiveCopier, TransferOutcome};
pub use differ::{ChangeSet, DiffSummary, TreeDiffer};
pub use error::{ArchiveError, Result};
pub use manifest::{ChecksumManifest, IntegrityVerdict};

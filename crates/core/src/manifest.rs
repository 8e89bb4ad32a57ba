use crate::{ArchiveError, Result};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const MANIFEST_FILE_NAME: &str = "checksum.md5";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub digest: String,
    /// Relative path with `/` separators.
    pub path: String,
}

/// Sorted `(md5, relative path)` pairs for every regular file under a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumManifest {
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestDelta {
    #[serde(rename = "only_in_source")]
    OnlyInLeft { path: String },
    #[serde(rename = "only_in_destination")]
    OnlyInRight { path: String },
    #[serde(rename = "digest_mismatch")]
    DigestMismatch {
        path: String,
        left: String,
        right: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntegrityVerdict {
    #[serde(rename = "verified")]
    Verified { files: usize },
    #[serde(rename = "not_checked")]
    NotChecked,
}

impl ChecksumManifest {
    /// Hash every regular file under `root`. A `checksum.md5` at the top
    /// level describes the tree and is left out.
    pub fn compute(root: &Path) -> Result<Self> {
        let root = fs::canonicalize(root).map_err(|e| ArchiveError::from_io(root, e))?;
        let mut entries = Vec::new();

        for entry in WalkDir::new(&root).min_depth(1).follow_links(false) {
            let entry = entry.map_err(ArchiveError::from_walk)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(&root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if relative == Path::new(MANIFEST_FILE_NAME) {
                continue;
            }

            entries.push(ManifestEntry {
                digest: hash_file(entry.path())?,
                path: to_manifest_path(relative),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        debug!("Hashed {} file(s) under {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// md5sum-compatible text: `<digest>  <path>` per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.digest);
            out.push_str("  ");
            out.push_str(&entry.path);
            out.push('\n');
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (digest, path) = line.split_once("  ").ok_or_else(|| ArchiveError::InvalidManifest {
                reason: format!("line {} has no digest/path separator", index + 1),
            })?;
            if digest.len() != 32 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ArchiveError::InvalidManifest {
                    reason: format!("line {} has a malformed digest '{}'", index + 1, digest),
                });
            }
            entries.push(ManifestEntry {
                digest: digest.to_ascii_lowercase(),
                path: path.to_string(),
            });
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { entries })
    }

    /// Write the rendered manifest as `<dir>/checksum.md5`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE_NAME);
        fs::write(&path, self.render()).map_err(|e| ArchiveError::from_io(&path, e))?;
        info!("Checksum manifest saved to {}", path.display());
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ArchiveError::from_io(path, e))?;
        Self::parse(&text)
    }

    /// Entries that are missing on one side or hash differently.
    pub fn diff(&self, other: &ChecksumManifest) -> Vec<ManifestDelta> {
        let left: BTreeMap<&str, &str> = self
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e.digest.as_str()))
            .collect();
        let right: BTreeMap<&str, &str> = other
            .entries
            .iter()
            .map(|e| (e.path.as_str(), e.digest.as_str()))
            .collect();

        let mut deltas = Vec::new();
        for (path, digest) in &left {
            match right.get(path) {
                None => deltas.push(ManifestDelta::OnlyInLeft {
                    path: path.to_string(),
                }),
                Some(other_digest) if other_digest != digest => {
                    deltas.push(ManifestDelta::DigestMismatch {
                        path: path.to_string(),
                        left: digest.to_string(),
                        right: other_digest.to_string(),
                    })
                }
                Some(_) => {}
            }
        }
        for path in right.keys() {
            if !left.contains_key(path) {
                deltas.push(ManifestDelta::OnlyInRight {
                    path: path.to_string(),
                });
            }
        }

        deltas
    }
}

/// Pass only when both manifests render to identical text.
pub fn verify(source: &ChecksumManifest, dest: &ChecksumManifest) -> Result<IntegrityVerdict> {
    if source.render() == dest.render() {
        return Ok(IntegrityVerdict::Verified { files: source.len() });
    }

    let deltas = source.diff(dest);
    for delta in &deltas {
        debug!("Checksum delta: {:?}", delta);
    }
    Err(ArchiveError::IntegrityMismatch {
        differing: deltas.len(),
    })
}

/// Compute manifests for both trees and compare them.
pub fn verify_copy(source: &Path, dest: &Path) -> Result<IntegrityVerdict> {
    let source_manifest = ChecksumManifest::compute(source)?;
    let dest_manifest = ChecksumManifest::compute(dest)?;
    verify(&source_manifest, &dest_manifest)
}

/// Calculate the MD5 digest of a file as lowercase hex.
pub fn hash_file(file_path: &Path) -> Result<String> {
    let mut file = File::open(file_path).map_err(|e| ArchiveError::from_io(file_path, e))?;

    let mut hasher = Md5::new();
    let mut buffer = [0; 8192];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| ArchiveError::from_io(file_path, e))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn to_manifest_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

use crate::{ArchiveError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Instrument name -> destination folder on the archive drive.
    pub instruments: BTreeMap<String, PathBuf>,
    /// Directory receiving one log file per run.
    pub log_output: Option<PathBuf>,
    /// Relative-path patterns the differ never reports.
    pub exclude: Vec<String>,
    pub archive: RunArchiveConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunArchiveConfig {
    pub raw_data_root: PathBuf,
    pub default_destination: PathBuf,
    pub threads: usize,
}

impl Default for RunArchiveConfig {
    fn default() -> Self {
        Self {
            raw_data_root: PathBuf::from("/mnt/Z/Raw-data/NGS"),
            default_destination: PathBuf::from("/mnt/data/archive/NGS_runs"),
            threads: 32,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            instruments: BTreeMap::new(),
            log_output: None,
            exclude: vec![
                "**/.DS_Store".to_string(),
                "**/Thumbs.db".to_string(),
                "**/$RECYCLE.BIN".to_string(),
                "**/System Volume Information".to_string(),
            ],
            archive: RunArchiveConfig::default(),
        }
    }
}

impl ArchiveConfig {
    /// Load config from an explicit file, or from the user config dir.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ArchiveError::NotFound {
                        path: path.to_path_buf(),
                    });
                }
                path.to_path_buf()
            }
            None => Self::get_config_path()?,
        };

        if config_path.exists() {
            debug!("Loading config from {}", config_path.display());
            let content = fs::read_to_string(&config_path)
                .map_err(|e| ArchiveError::Config(format!("Failed to read config file: {}", e)))?;
            Self::from_yaml(&content)
        } else {
            debug!("Config file not found at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ArchiveError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Get the config file path
    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ArchiveError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("seqarchive").join("config.yaml"))
    }

    /// Destination folder configured for an instrument.
    pub fn instrument_destination(&self, instrument: &str) -> Result<&Path> {
        self.instruments
            .get(instrument)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                let known: Vec<&str> = self.instruments.keys().map(String::as_str).collect();
                ArchiveError::Config(format!(
                    "Unknown instrument '{}', choose one of: {:?}",
                    instrument, known
                ))
            })
    }

    /// Validate config settings
    pub fn validate(&self) -> Result<()> {
        for (name, path) in &self.instruments {
            if path.as_os_str().is_empty() {
                return Err(ArchiveError::Config(format!(
                    "Instrument '{}' has no destination path configured",
                    name
                )));
            }
            if !path.is_absolute() {
                warn!("Destination for '{}' should be an absolute path: {}", name, path.display());
            }
        }

        if self.archive.threads == 0 {
            return Err(ArchiveError::Config("archive.threads must be greater than 0".to_string()));
        }

        Ok(())
    }
}

//! Settings for a mirroring job, loaded from arguments or a TOML file

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::comparator::HashAlgorithm;
use crate::diff::{CaseSensitivity, DiffOptions};
use crate::error::{Result, SyncError};
use crate::sync_engine::SyncOptions;

/// Everything needed to run the mirroring loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Tree to mirror; must exist
    pub source: PathBuf,
    /// Mirror destination; created when missing
    pub replica: PathBuf,
    /// Where operation outcomes are appended
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Pause between cycles, in whole seconds
    pub interval_secs: u64,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
    /// Overrides the host-native path matching
    #[serde(default)]
    pub case_sensitivity: Option<CaseSensitivity>,
}

impl Settings {
    /// Build settings from raw command-line values
    pub fn from_args(
        source: impl Into<PathBuf>,
        replica: impl Into<PathBuf>,
        log_file: Option<PathBuf>,
        interval: &str,
    ) -> Result<Self> {
        let settings = Self {
            source: source.into(),
            replica: replica.into(),
            log_file,
            interval_secs: parse_interval(interval)?,
            hash_algorithm: HashAlgorithm::default(),
            case_sensitivity: None,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| SyncError::config_error(format!("Invalid settings file: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::config_error(format!(
                "Failed to read settings file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(SyncError::config_error(format!(
                "Source folder path does not exist: {}",
                self.source.display()
            )));
        }

        if self.interval_secs == 0 {
            return Err(SyncError::config_error(
                "Synchronization interval must be a positive number of seconds",
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Engine options derived from these settings
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            hash_algorithm: self.hash_algorithm,
            diff_options: DiffOptions {
                case_sensitivity: self.case_sensitivity.unwrap_or_default(),
            },
            ..SyncOptions::default()
        }
    }
}

/// Parse a sync interval given in whole seconds
pub fn parse_interval(value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(SyncError::config_error(format!(
            "Synchronization interval should be a positive whole number of seconds, for example '600' (got '{}')",
            value
        ))),
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blake3" => Ok(Self::Blake3),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("Unknown hash algorithm '{}' (expected blake3 or sha256)", other)),
        }
    }
}

impl FromStr for CaseSensitivity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sensitive" => Ok(Self::Sensitive),
            "insensitive" => Ok(Self::Insensitive),
            other => Err(format!(
                "Unknown case sensitivity '{}' (expected sensitive or insensitive)",
                other
            )),
        }
    }
}

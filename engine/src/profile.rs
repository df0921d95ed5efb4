//! Backup profiles and their configuration file.
//!
//! A profile names one source → destination backup job: the original tree,
//! the backup tree, the index file tracking what was backed up, and the
//! blacklist of path substrings excluded from traversal. Profiles are read
//! from a JSON configuration file, validated once, and immutable for the
//! life of a run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Raw profile record as stored in the configuration file. All fields are
/// optional at this stage so that validation can report every missing
/// attribute at once instead of failing on the first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: Option<String>,
    pub original_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub index_path: Option<PathBuf>,
    #[serde(default)]
    pub description: Option<String>,
    /// Comma-separated path substrings excluded from traversal
    #[serde(default)]
    pub blacklist: Option<String>,
}

/// A named, validated source → destination backup job.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    /// Root of the tree being backed up
    pub original_path: PathBuf,
    /// Root of the backup tree
    pub backup_path: PathBuf,
    /// Location of this profile's index file
    pub index_path: PathBuf,
    pub description: Option<String>,
    /// Path substrings whose containing directories are pruned from the walk
    pub blacklist: Vec<String>,
}

impl Profile {
    /// Validate a raw configuration record into a usable profile.
    ///
    /// # Errors
    /// Returns `MissingAttributes` naming every absent required field.
    pub fn from_config(config: ProfileConfig) -> Result<Profile> {
        let mut missing = Vec::new();
        if config.name.is_none() {
            missing.push("name");
        }
        if config.original_path.is_none() {
            missing.push("original_path");
        }
        if config.backup_path.is_none() {
            missing.push("backup_path");
        }
        if config.index_path.is_none() {
            missing.push("index_path");
        }
        let blacklist = config
            .blacklist
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();

        let (Some(name), Some(original_path), Some(backup_path), Some(index_path)) = (
            config.name,
            config.original_path,
            config.backup_path,
            config.index_path,
        ) else {
            return Err(EngineError::MissingAttributes { missing });
        };

        Ok(Profile {
            name,
            original_path,
            backup_path,
            index_path,
            description: config.description,
            blacklist,
        })
    }

    /// Compute where a source file is stored under the backup root,
    /// preserving its path relative to the original root.
    pub fn destination_for(&self, source: &Path) -> PathBuf {
        match source.strip_prefix(&self.original_path) {
            Ok(rel) => self.backup_path.join(rel),
            // not under the original root; fall back to the bare file name
            Err(_) => self
                .backup_path
                .join(source.file_name().unwrap_or_default()),
        }
    }

    /// True when any blacklist entry occurs anywhere in the path's text.
    ///
    /// Deliberately permissive: an entry matching any substring of a path
    /// excludes that path, which is simple and sufficient for its intended
    /// use but can over-match short entries.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let text = path.to_string_lossy();
        self.blacklist.iter().any(|entry| text.contains(entry.as_str()))
    }

    /// Precondition gate evaluated before a run is attempted, not during
    /// the scan: the original and backup roots must be reachable and the
    /// index file must exist or be creatable (parents included). Profiles
    /// failing this are skipped by the orchestrator.
    pub fn is_executable(&self) -> bool {
        if !self.original_path.exists() || !self.backup_path.exists() {
            return false;
        }
        if self.index_path.exists() {
            return true;
        }
        if let Some(parent) = self.index_path.parent() {
            if !parent.as_os_str().is_empty() && fs::create_dir_all(parent).is_err() {
                return false;
            }
        }
        fs::File::create(&self.index_path).is_ok()
    }
}

/// Load and validate every profile in the configuration file.
///
/// # Errors
/// `ConfigNotFound` when the file does not exist (the caller aborts the
/// whole run on this), `ConfigInvalid` on parse failure, and the first
/// profile validation error otherwise.
pub fn load_profiles(path: &Path) -> Result<Vec<Profile>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::ConfigNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(EngineError::ReadError {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let configs: Vec<ProfileConfig> =
        serde_json::from_str(&text).map_err(|e| EngineError::ConfigInvalid {
            path: path.to_path_buf(),
            source: e,
        })?;

    configs.into_iter().map(Profile::from_config).collect()
}

//! Uploader configuration.
//!
//! Reads/writes JSON at `~/.config/bulkup/config.json` (`%APPDATA%\bulkup`
//! on Windows). Every field has a default, so partial files are fine.

use std::path::{Path, PathBuf};

use bulkup_file_ops::{ClassifierRules, FsDirectorySource};
use bulkup_protocol::{CHUNK_SIZE, DEFAULT_PAGE_SIZE, UploadMode};
use bulkup_transfer::ChunkPlanner;
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorOptions;
use crate::error::UploadError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploaderConfig {
    pub chunk_size: u64,
    pub workers: usize,
    pub max_in_flight: usize,
    pub page_size: usize,
    pub mode: UploadMode,
    pub classifier: ClassifierRules,
    pub owner_id: String,
    pub repository_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub section: String,
    /// Prefix prepended to every destination path.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub destination_prefix: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        let options = CoordinatorOptions::default();
        Self {
            chunk_size: CHUNK_SIZE,
            workers: options.workers,
            max_in_flight: options.max_in_flight,
            page_size: DEFAULT_PAGE_SIZE,
            mode: UploadMode::default(),
            classifier: ClassifierRules::default(),
            owner_id: String::new(),
            repository_name: String::new(),
            section: String::new(),
            destination_prefix: String::new(),
        }
    }
}

impl UploaderConfig {
    /// Loads the config from its default location.
    pub fn load() -> Result<Self, UploadError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`. A missing file yields defaults; an unparsable one
    /// is logged and also yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, UploadError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => Ok(config.normalized()),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse uploader config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    /// Saves to the default location.
    pub fn save(&self) -> Result<(), UploadError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), UploadError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, &json)?;
        set_permissions_0600(path);

        tracing::debug!(path = %path.display(), "uploader configuration saved");
        Ok(())
    }

    /// Replaces zero values that would stall an upload.
    fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.chunk_size == 0 {
            self.chunk_size = defaults.chunk_size;
        }
        if self.workers == 0 {
            self.workers = defaults.workers;
        }
        if self.max_in_flight == 0 {
            self.max_in_flight = defaults.max_in_flight;
        }
        if self.page_size == 0 {
            self.page_size = defaults.page_size;
        }
        self
    }

    pub fn planner(&self) -> Result<ChunkPlanner, UploadError> {
        Ok(ChunkPlanner::new(self.chunk_size)?)
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            workers: self.workers,
            max_in_flight: self.max_in_flight,
        }
    }

    pub fn directory_source(&self) -> FsDirectorySource {
        FsDirectorySource::new(self.page_size)
    }
}

/// Path of the config file for the current user.
pub fn config_file_path() -> PathBuf {
    config_base_dir().join("bulkup").join("config.json")
}

fn config_base_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp")
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

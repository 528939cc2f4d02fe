//! Configuration management for Keel.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.
//! It tunes the store itself (polling, watching, session mode); the settings
//! the store manages live in their own JSON files.

use crate::error::{KeelError, Result};
use crate::idle::{DirIdlePolicy, IdlePoller, DEFAULT_MAX_ATTEMPTS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure for Keel.
///
/// ## Example Configuration File (keel.toml)
///
/// ```toml
/// [general]
/// log_level = "info"
/// file_name = "app.json"
///
/// [poll]
/// max_attempts = 30000
/// backoff_steps = 0
/// unit_ms = 1
/// dir_policy = "all_files"
///
/// [watch]
/// enabled = true
/// settle_ms = 25
///
/// [session]
/// mode = "auto"
///
/// [access]
/// probe = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// File availability polling
    pub poll: PollConfig,

    /// Change watching
    pub watch: WatchConfig,

    /// Interactive or headless session
    pub session: SessionConfig,

    /// Permission probing
    pub access: AccessConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding settings files (None = default location)
    pub location: Option<PathBuf>,

    /// Settings file name inside the location
    pub file_name: String,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            location: None,
            file_name: "settings.json".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollConfig {
    /// Attempts before giving up on a busy file
    pub max_attempts: u32,

    /// Linear backoff steps; each retry sleeps `100 * steps + 1` units
    pub backoff_steps: u32,

    /// Length of one unit in milliseconds
    pub unit_ms: u64,

    /// How a directory's idle state is derived
    pub dir_policy: DirIdlePolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_steps: 0,
            unit_ms: 1,
            dir_policy: DirIdlePolicy::AllFiles,
        }
    }
}

impl PollConfig {
    /// Build the poller described by this section.
    pub fn poller(&self) -> IdlePoller {
        IdlePoller::new()
            .with_max_attempts(self.max_attempts)
            .with_backoff_steps(self.backoff_steps)
            .with_unit(Duration::from_millis(self.unit_ms))
            .with_dir_policy(self.dir_policy)
    }
}

/// Watch configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchConfig {
    /// Reload when another process modifies the file
    pub enabled: bool,

    /// Milliseconds to let a writer finish before reading the change
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        WatchConfig {
            enabled: true,
            settle_ms: 25,
        }
    }
}

/// Whether a user is around to answer prompts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Interactive when stdin is a terminal
    #[default]
    Auto,
    Interactive,
    Headless,
}

/// Session configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
}

/// Permission probe configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AccessConfig {
    /// Check permissions before reading and writing the settings file
    pub probe: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        AccessConfig { probe: true }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| KeelError::Config {
            reason: format!("Failed to parse config: {}", e),
        })?;

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Render the configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KeelError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("keel.toml"))
    }

    /// Directory holding settings files (from config or default).
    pub fn settings_dir(&self) -> Result<PathBuf> {
        match &self.general.location {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::project_dirs()?.config_dir().to_path_buf()),
        }
    }

    /// Full path of the settings file.
    pub fn settings_file(&self) -> Result<PathBuf> {
        Ok(self.settings_dir()?.join(&self.general.file_name))
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("", "", "keel").ok_or_else(|| KeelError::Config {
            reason: "Could not determine config directory".to_string(),
        })
    }
}

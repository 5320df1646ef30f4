//! Persistent application settings.
//!
//! Handles loading, saving, and managing application-wide settings: where
//! exported playlists live, the content cache, playback behaviour and
//! logging.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheConfig;
use crate::error::{Error, Result, create_dir_error, read_error, write_error};
use crate::logging::LoggingConfig;
use crate::playback::PlaybackConfig;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory where playlist documents are stored.
    pub playlists_directory: PathBuf,
    /// Content cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Playback configuration.
    #[serde(default)]
    pub playback: PlaybackConfig,
    /// Logging setup, applied by [`crate::logging::init`].
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            playlists_directory: default_playlists_directory(),
            cache: CacheConfig::default(),
            playback: PlaybackConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, or create defaults if
    /// no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from `path`, writing defaults there if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save_to(path) {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|e| read_error(path, &e))?;
        let mut config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;
        config.cache.validate();

        info!("Loaded config from {}", path.display());
        debug!(
            "Playlists directory: {}, cache directory: {}",
            config.playlists_directory.display(),
            config.cache.cache_dir().display()
        );
        Ok(config)
    }

    /// Save configuration to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| create_dir_error(parent, &e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| write_error(path, &e))?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Update the playlists directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be used for storage.
    pub fn set_playlists_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_storage_directory(&path)?;
        self.playlists_directory = path;
        info!(
            "Updated playlists directory to: {}",
            self.playlists_directory.display()
        );
        Ok(())
    }

    /// Update the content cache directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be used for storage.
    pub fn set_cache_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_storage_directory(&path)?;
        info!("Updated cache directory to: {}", path.display());
        self.cache.custom_cache_dir = Some(path);
        Ok(())
    }

    /// Location of `config.json` in the platform config directory.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Platform default for exported playlists: `<data_local>/cloudtape/playlists`.
#[must_use]
pub fn default_playlists_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudtape")
        .join("playlists")
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("cloudtape")
        .join("config.json")
}

/// Check that `path` is an absolute, writable directory, creating it if
/// needed.
///
/// # Errors
///
/// Returns [`Error::Configuration`] describing the first problem found.
pub fn validate_storage_directory(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Configuration(
            "Storage directory must be an absolute path".to_string(),
        ));
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }

        let probe = path.join(".cloudtape_write_test");
        match fs::write(&probe, "test") {
            Ok(()) => {
                if let Err(e) = fs::remove_file(&probe) {
                    debug!("Failed to remove write probe {}: {}", probe.display(), e);
                }
            }
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "Directory is not writable: {} ({})",
                    path.display(),
                    e
                )));
            }
        }
    } else {
        fs::create_dir_all(path).map_err(|e| {
            Error::Configuration(format!("Cannot create directory {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}

/// Holds the loaded configuration and writes every change back to disk.
pub struct ConfigManager {
    path: PathBuf,
    config: AppConfig,
}

impl ConfigManager {
    /// Load the configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn new() -> Result<Self> {
        Self::with_path(config_file_path())
    }

    /// Load the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be loaded.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        let config = AppConfig::load_from(&path)?;
        Ok(Self { path, config })
    }

    /// The configuration as last loaded or saved.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Path of the backing config file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Where exported playlists are written.
    #[must_use]
    pub fn playlists_directory(&self) -> &Path {
        &self.config.playlists_directory
    }

    /// Replace the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the playlists directory is unusable or the config
    /// cannot be saved.
    pub fn update(&mut self, mut config: AppConfig) -> Result<()> {
        validate_storage_directory(&config.playlists_directory)?;
        config.cache.validate();
        self.config = config;
        self.config.save_to(&self.path)
    }

    /// Change the playlists directory and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is invalid or config cannot be saved.
    pub fn set_playlists_directory(&mut self, path: PathBuf) -> Result<()> {
        self.config.set_playlists_directory(path)?;
        self.config.save_to(&self.path)
    }

    /// Restore defaults and save them.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be saved.
    pub fn reset(&mut self) -> Result<()> {
        self.config = AppConfig::default();
        self.config.save_to(&self.path)
    }
}

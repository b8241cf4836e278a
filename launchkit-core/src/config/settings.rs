//! Launcher settings.
//!
//! Settings are persisted as JSON under the user's config directory
//! (`{config}/launchkit/settings.json`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Subdirectory name used under the OS config, data and temp folders.
const APP_DIR: &str = "launchkit";

/// Default base URL for module manifests and primary jars.
pub const DEFAULT_DOWNLOAD_BASE: &str = "https://s3.amazonaws.com/Minecraft.Download/";

/// Default base URL for libraries that do not declare their own.
pub const DEFAULT_LIBRARIES_BASE: &str = "https://libraries.minecraft.net/";

// =============================================================================
// Application Settings
// =============================================================================

/// Launcher settings - persisted to disk as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root of the installed game files (`versions/`, `libraries/`).
    pub game_dir: PathBuf,

    /// Scratch directory for downloads and archive staging.
    pub temp_dir: PathBuf,

    /// Base URL for module manifests and primary jars.
    pub download_base: String,

    /// Base URL for libraries without an explicit `url`.
    pub libraries_base: String,

    /// Maximum number of downloads running at once per queue.
    pub download_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let game_dir = dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR));

        Self {
            game_dir,
            temp_dir: std::env::temp_dir().join(APP_DIR),
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            libraries_base: DEFAULT_LIBRARIES_BASE.to_string(),
            download_concurrency: 4,
        }
    }
}

impl Settings {
    /// Returns the default settings file location, if the OS has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("settings.json"))
    }

    /// Load settings from the default location, using defaults when absent.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load settings from a file.
    ///
    /// If the file doesn't exist or can't be parsed, returns defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No settings at {} ({}), using defaults", path.display(), e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>(&content) {
            Ok(settings) => settings.normalized(),
            Err(e) => {
                warn!(
                    "Failed to parse settings at {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save settings to the default location.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()
            .ok_or_else(|| anyhow::anyhow!("No config directory available on this system"))?;
        self.save_to(&path)
    }

    /// Save settings to a file as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        debug!("Settings saved to {}", path.display());
        Ok(())
    }

    fn normalized(mut self) -> Self {
        if self.download_concurrency == 0 {
            self.download_concurrency = 1;
        }
        if !self.download_base.ends_with('/') {
            self.download_base.push('/');
        }
        if !self.libraries_base.ends_with('/') {
            self.libraries_base.push('/');
        }
        self
    }
}

// SPDX-License-Identifier: GPL-3.0-only

//! Persisted viewer settings
//!
//! Stored as pretty-printed JSON under the platform config directory.
//! Absent or malformed files fall back to defaults with a logged warning;
//! saving is best-effort and never interrupts capture or rendering.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::compositor::transform::Rotation;
use crate::errors::AppResult;

/// Viewer settings persisted between runs
///
/// Fields missing from an older settings file take their default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last selected left-eye device ID
    pub left_device: Option<String>,
    /// Last selected right-eye device ID
    pub right_device: Option<String>,
    /// Left-eye rotation correction
    pub left_rotation: Rotation,
    /// Right-eye rotation correction
    pub right_rotation: Rotation,
    /// Parallax control value in the control range
    pub parallax: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            left_device: None,
            right_device: None,
            left_rotation: Rotation::default(),
            right_rotation: Rotation::default(),
            parallax: 0.0,
        }
    }
}

impl Settings {
    /// Settings file location under the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("anaglyph").join("settings.json"))
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> AppResult<Self> {
        let json = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&json)?;
        Ok(settings)
    }

    /// Save settings to a file, creating parent directories as needed
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(path = %path.display(), "Saved settings");
        Ok(())
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            warn!("No config directory available, using default settings");
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(settings) => {
                info!(path = %path.display(), "Loaded settings");
                settings
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to load settings, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Best-effort save to the default location
    pub fn store(&self) {
        let Some(path) = Self::default_path() else {
            warn!("No config directory available, settings not saved");
            return;
        };
        if let Err(err) = self.save(&path) {
            warn!(path = %path.display(), error = %err, "Failed to save settings");
        }
    }
}

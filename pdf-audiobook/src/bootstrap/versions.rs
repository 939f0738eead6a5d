//! Pinned versions and the record of what has been installed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Pinned Python version; Kokoro supports 3.10 through 3.12.
pub const PYTHON_VERSION: &str = "3.11.11";

/// python-build-standalone release tag.
pub const PYTHON_RELEASE_TAG: &str = "20241206";

/// FFmpeg version identifier (for tracking, actual version from download).
pub const FFMPEG_VERSION: &str = "7.1";

const MANIFEST_FILE: &str = "versions.json";

/// Installed component versions (persisted to `bootstrap/versions.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InstalledVersions {
    pub python_version: Option<String>,
    pub python_release_tag: Option<String>,
    pub ffmpeg_version: Option<String>,
    /// Platform string when installed (e.g., "Linux-x86_64").
    pub platform: Option<String>,
    pub installed_at: Option<DateTime<Utc>>,
}

impl InstalledVersions {
    /// Load the manifest, or an empty one when nothing was installed yet.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = manifest_path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).context("Failed to read versions.json")?;
        serde_json::from_str(&content).context("Failed to parse versions.json")
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = manifest_path(data_dir);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content).context("Failed to write versions.json")
    }

    /// Check if the platform has changed (e.g., Intel to Apple Silicon).
    pub fn platform_matches(&self, current_platform: &str) -> bool {
        self.platform.as_deref() == Some(current_platform)
    }

    pub fn set_python(&mut self, version: &str, release_tag: &str) {
        self.python_version = Some(version.to_string());
        self.python_release_tag = Some(release_tag.to_string());
        self.installed_at = Some(Utc::now());
    }

    pub fn set_ffmpeg(&mut self, version: &str) {
        self.ffmpeg_version = Some(version.to_string());
        self.installed_at = Some(Utc::now());
    }

    pub fn set_platform(&mut self, platform: &str) {
        self.platform = Some(platform.to_string());
    }
}

fn manifest_path(data_dir: &Path) -> PathBuf {
    data_dir.join("bootstrap").join(MANIFEST_FILE)
}

/// Get the data directory for pdf2audio (`~/.local/share/pdf2audio` on Linux).
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .map(|d| d.join("pdf2audio"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir)
}

pub fn get_bootstrap_dir() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("bootstrap"))
}

pub fn get_python_dir() -> Result<PathBuf> {
    Ok(get_bootstrap_dir()?.join("python"))
}

pub fn get_venv_dir() -> Result<PathBuf> {
    Ok(get_bootstrap_dir()?.join("venv"))
}

pub fn get_ffmpeg_dir() -> Result<PathBuf> {
    Ok(get_bootstrap_dir()?.join("ffmpeg"))
}

//! Bootstrap module for managing Python and FFmpeg dependencies.
//!
//! This module handles automatic downloading and installation of:
//! - Portable Python from python-build-standalone
//! - A static FFmpeg binary
//! - A Python virtual environment with Kokoro TTS
//!
//! It also owns the startup capability probe, which decides once per run what
//! the pipeline can rely on.

pub mod download;
pub mod ffmpeg;
pub mod platform;
pub mod python;
pub mod versions;

use crate::extract::ocr::TesseractOcr;
use anyhow::{Context, Result};
use platform::Platform;
use std::io::{self, Write};
use std::path::Path;
use versions::{FFMPEG_VERSION, InstalledVersions, PYTHON_RELEASE_TAG, PYTHON_VERSION, get_data_dir};

/// Bootstrap status indicating what needs to be done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Ready,
    /// First run: Python, FFmpeg and packages are all missing.
    NeedsFullBootstrap,
    /// Only Python packages need to be installed.
    NeedsPackages,
    /// Installed for a different OS/architecture.
    PlatformChanged,
}

/// Check the current bootstrap status.
pub fn check_status() -> Result<BootstrapStatus> {
    let platform = Platform::detect()?;
    let data_dir = get_data_dir()?;
    let versions = InstalledVersions::load(&data_dir)?;

    if versions.platform.is_some() && !versions.platform_matches(&platform.to_version_string()) {
        return Ok(BootstrapStatus::PlatformChanged);
    }

    if !python::is_python_installed()? || !ffmpeg::is_ffmpeg_available() {
        return Ok(BootstrapStatus::NeedsFullBootstrap);
    }

    if !python::is_venv_ready()? || !python::is_kokoro_installed()? {
        return Ok(BootstrapStatus::NeedsPackages);
    }

    Ok(BootstrapStatus::Ready)
}

/// What this machine can do, probed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Kokoro importable from the venv
    pub tts: bool,
    /// FFmpeg runnable (bootstrapped or system)
    pub ffmpeg: bool,
    /// `pdftoppm` and `tesseract` both runnable
    pub ocr: bool,
}

impl Capabilities {
    pub fn probe() -> Self {
        let caps = Self {
            tts: python::is_kokoro_installed().unwrap_or(false),
            ffmpeg: ffmpeg::is_ffmpeg_available(),
            ocr: TesseractOcr::is_available(),
        };
        log::debug!("Capabilities: {:?}", caps);
        caps
    }

    /// Fail with an actionable message when a hard requirement is missing.
    pub fn require_pipeline(&self) -> Result<()> {
        let mut missing = Vec::new();
        if !self.tts {
            missing.push("the Kokoro TTS runtime");
        }
        if !self.ffmpeg {
            missing.push("FFmpeg");
        }
        if missing.is_empty() {
            return Ok(());
        }

        anyhow::bail!(
            "Missing {}.\n\nRun 'pdf2audio setup' to install everything into {}.",
            missing.join(" and "),
            get_data_dir()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|_| "the data directory".to_string())
        )
    }
}

/// Install whatever is missing, asking for confirmation before large downloads.
pub async fn run_setup(assume_yes: bool) -> Result<()> {
    match check_status()? {
        BootstrapStatus::Ready => {
            eprintln!("Everything is already installed.");
        }
        BootstrapStatus::NeedsPackages => {
            eprintln!("Python packages need to be installed...\n");
            if !python::is_venv_ready()? {
                python::create_venv()?;
            }
            install_packages()?;
        }
        status @ (BootstrapStatus::NeedsFullBootstrap | BootstrapStatus::PlatformChanged) => {
            if status == BootstrapStatus::PlatformChanged {
                eprintln!("Platform has changed, reinstalling dependencies...\n");
            }
            if !assume_yes && !confirm_bootstrap()? {
                anyhow::bail!("Setup cancelled by user");
            }
            run_full_bootstrap().await?;
        }
    }

    Ok(())
}

fn confirm_bootstrap() -> Result<bool> {
    eprintln!();
    eprintln!("pdf2audio requires a one-time setup (~1.5 GB download):");
    eprintln!("  - Python {} (~25 MB)", PYTHON_VERSION);
    eprintln!("  - FFmpeg {} (~30 MB)", FFMPEG_VERSION);
    eprintln!("  - Kokoro TTS + PyTorch (CPU)");
    eprintln!();
    eprintln!("All files will be stored in {}", get_data_dir()?.display());
    eprintln!("Run 'pdf2audio uninstall' to remove everything.");
    eprintln!();
    eprint!("Continue? [Y/n] ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input.is_empty() || input == "y" || input == "yes")
}

async fn run_full_bootstrap() -> Result<()> {
    let platform = Platform::detect()?;
    let data_dir = get_data_dir()?;
    let mut versions = InstalledVersions::load(&data_dir)?;

    eprintln!();
    eprintln!("[1/4] Downloading Python {}...", PYTHON_VERSION);
    python::install_python(&platform).await?;
    versions.set_python(PYTHON_VERSION, PYTHON_RELEASE_TAG);
    versions.set_platform(&platform.to_version_string());
    versions.save(&data_dir)?;

    eprintln!();
    eprintln!("[2/4] Setting up Python environment...");
    python::create_venv()?;

    eprintln!();
    if ffmpeg::is_ffmpeg_installed()? {
        eprintln!("[3/4] FFmpeg already installed.");
    } else {
        eprintln!("[3/4] Downloading FFmpeg {}...", FFMPEG_VERSION);
        ffmpeg::install_ffmpeg(&platform).await?;
        versions.set_ffmpeg(FFMPEG_VERSION);
        versions.save(&data_dir)?;
    }

    eprintln!();
    eprintln!("[4/4] Installing Kokoro TTS... (this may take several minutes)");
    install_packages()?;

    eprintln!();
    eprintln!("Setup complete!");
    if !TesseractOcr::is_available() {
        eprintln!(
            "Note: OCR for scanned PDFs is disabled. Install tesseract and poppler-utils to enable it."
        );
    }

    Ok(())
}

fn install_packages() -> Result<()> {
    python::install_packages(|msg| {
        eprintln!("  {}", msg);
    })?;

    if !python::is_kokoro_installed()? {
        anyhow::bail!("Kokoro installation verification failed");
    }

    Ok(())
}

/// Statistics about cleanup operation.
#[derive(Debug, Default)]
pub struct CleanupStats {
    pub data_removed: bool,
    pub data_size: u64,
    pub models_removed: bool,
    pub models_size: u64,
}

impl CleanupStats {
    pub fn total_size(&self) -> u64 {
        self.data_size + self.models_size
    }
}

/// Remove all bootstrap data, and optionally the cached Kokoro model weights.
pub fn clean_all(include_models: bool) -> Result<CleanupStats> {
    let data_dir = get_data_dir()?;
    let mut stats = CleanupStats::default();

    if data_dir.exists() {
        stats.data_size = dir_size(&data_dir).unwrap_or(0);
        std::fs::remove_dir_all(&data_dir).context("Failed to remove data directory")?;
        stats.data_removed = true;
    }

    if include_models {
        if let Some(cache_dir) = dirs::cache_dir() {
            let hf_cache = cache_dir.join("huggingface").join("hub");
            if hf_cache.exists() {
                for entry in std::fs::read_dir(&hf_cache)? {
                    let entry = entry?;
                    if entry.file_name().to_string_lossy().contains("Kokoro") {
                        stats.models_size += dir_size(&entry.path()).unwrap_or(0);
                        std::fs::remove_dir_all(entry.path())?;
                        stats.models_removed = true;
                    }
                }
            }
        }
    }

    Ok(stats)
}

fn dir_size(path: &Path) -> Result<u64> {
    if path.is_file() {
        return Ok(std::fs::metadata(path)?.len());
    }

    let mut size = 0;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += metadata.len();
        }
    }

    Ok(size)
}

/// Get information about the current bootstrap state.
pub fn get_info() -> Result<String> {
    let platform = Platform::detect()?;
    let data_dir = get_data_dir()?;
    let versions = InstalledVersions::load(&data_dir)?;
    let caps = Capabilities::probe();

    let mut info = String::new();
    info.push_str(&format!("Platform: {}\n", platform));
    info.push_str(&format!("Data directory: {}\n", data_dir.display()));
    info.push_str(&format!("Bootstrap status: {:?}\n\n", check_status()?));

    match &versions.python_version {
        Some(v) => info.push_str(&format!("Python version: {}\n", v)),
        None => info.push_str("Python: not installed\n"),
    }
    match &versions.ffmpeg_version {
        Some(v) => info.push_str(&format!("FFmpeg version: {}\n", v)),
        None => info.push_str("FFmpeg: not bootstrapped\n"),
    }

    info.push('\n');
    info.push_str(&python::get_env_info()?);
    info.push('\n');
    info.push_str(&format!("FFmpeg: {}\n", ffmpeg::resolve_ffmpeg().display()));
    info.push_str(&format!("TTS available: {}\n", caps.tts));
    info.push_str(&format!("FFmpeg available: {}\n", caps.ffmpeg));
    info.push_str(&format!("OCR available: {}\n", caps.ocr));

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_require_pipeline_reports_missing_parts() {
        let caps = Capabilities {
            tts: false,
            ffmpeg: false,
            ocr: true,
        };
        let msg = caps.require_pipeline().unwrap_err().to_string();
        assert!(msg.contains("Kokoro"));
        assert!(msg.contains("FFmpeg"));
        assert!(msg.contains("pdf2audio setup"));
    }

    #[test]
    fn test_require_pipeline_ignores_ocr() {
        let caps = Capabilities {
            tts: true,
            ffmpeg: true,
            ocr: false,
        };
        assert!(caps.require_pipeline().is_ok());
    }

    #[test]
    fn test_dir_size() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a"), vec![0u8; 100]).unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();
        std::fs::write(temp.path().join("sub").join("b"), vec![0u8; 50]).unwrap();
        assert_eq!(dir_size(temp.path()).unwrap(), 150);
    }

    #[test]
    fn test_cleanup_stats_total() {
        let stats = CleanupStats {
            data_removed: true,
            data_size: 10,
            models_removed: true,
            models_size: 5,
        };
        assert_eq!(stats.total_size(), 15);
    }
}

//! FFmpeg location, download and extraction.
//!
//! Only the `ffmpeg` binary is needed: MP3 encoding goes through `libmp3lame`,
//! which the static builds include.

use super::download::download_file;
use super::platform::{Arch, Os, Platform};
use super::versions::{FFMPEG_VERSION, get_ffmpeg_dir};
use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Get the download URL for a static FFmpeg build.
pub fn get_ffmpeg_download_url(platform: &Platform) -> &'static str {
    match (platform.os, platform.arch) {
        (Os::MacOs, Arch::Aarch64) => {
            "https://ffmpeg.martin-riedl.de/redirect/latest/macos/arm64/release/ffmpeg.zip"
        }
        (Os::MacOs, Arch::X86_64) => {
            "https://ffmpeg.martin-riedl.de/redirect/latest/macos/amd64/release/ffmpeg.zip"
        }
        (Os::Linux, Arch::X86_64) => {
            "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-amd64-static.tar.xz"
        }
        (Os::Linux, Arch::Aarch64) => {
            "https://johnvansickle.com/ffmpeg/releases/ffmpeg-release-arm64-static.tar.xz"
        }
    }
}

/// Get the path to the bootstrapped FFmpeg executable.
pub fn get_ffmpeg_executable() -> Result<PathBuf> {
    Ok(get_ffmpeg_dir()?.join("ffmpeg"))
}

/// The FFmpeg to run: the bootstrapped one if present, else `ffmpeg` from PATH.
pub fn resolve_ffmpeg() -> PathBuf {
    match get_ffmpeg_executable() {
        Ok(path) if path.exists() => path,
        _ => PathBuf::from("ffmpeg"),
    }
}

fn runs(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check if the bootstrapped FFmpeg is installed and working.
pub fn is_ffmpeg_installed() -> Result<bool> {
    let path = get_ffmpeg_executable()?;
    Ok(path.exists() && runs(&path))
}

/// Check if any FFmpeg (bootstrapped or system) is available.
pub fn is_ffmpeg_available() -> bool {
    runs(&resolve_ffmpeg())
}

/// Download and install FFmpeg into the bootstrap directory.
pub async fn install_ffmpeg(platform: &Platform) -> Result<PathBuf> {
    let ffmpeg_dir = get_ffmpeg_dir()?;
    std::fs::create_dir_all(&ffmpeg_dir)?;
    let ffmpeg_path = get_ffmpeg_executable()?;

    let url = get_ffmpeg_download_url(platform);
    let temp_dir = tempfile::tempdir()?;
    let description = format!("Downloading FFmpeg {}...", FFMPEG_VERSION);

    match platform.os {
        Os::MacOs => {
            let archive = temp_dir.path().join("ffmpeg.zip");
            download_file(url, &archive, &description).await?;
            eprintln!("  Extracting FFmpeg...");
            extract_ffmpeg_zip(&archive, &ffmpeg_path)?;
        }
        Os::Linux => {
            let archive = temp_dir.path().join("ffmpeg.tar.xz");
            download_file(url, &archive, &description).await?;
            eprintln!("  Extracting FFmpeg...");
            extract_ffmpeg_tar_xz(&archive, &ffmpeg_path)?;
        }
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(&ffmpeg_path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&ffmpeg_path, perms)?;
    }

    let output = Command::new(&ffmpeg_path)
        .arg("-version")
        .output()
        .context("Failed to run installed FFmpeg")?;

    if !output.status.success() {
        anyhow::bail!("FFmpeg installation verification failed");
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let version_line = stdout.lines().next().unwrap_or("unknown");
    eprintln!("  Installed {}", version_line);

    Ok(ffmpeg_path)
}

/// Whether an archive entry is the `ffmpeg` binary itself.
fn is_ffmpeg_entry(name: &str) -> bool {
    Path::new(name).file_name().and_then(|n| n.to_str()) == Some("ffmpeg")
}

/// Extract the binary from a macOS zip distribution.
fn extract_ffmpeg_zip(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !is_ffmpeg_entry(entry.name()) {
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        std::fs::write(destination, content)?;
        return Ok(());
    }

    anyhow::bail!("ffmpeg binary not found in zip archive")
}

/// Extract the binary from a Linux static build tar.xz.
fn extract_ffmpeg_tar_xz(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(xz2::read::XzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let is_binary = entry
            .path()?
            .to_str()
            .map(is_ffmpeg_entry)
            .unwrap_or(false);
        if !is_binary {
            continue;
        }

        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        std::fs::write(destination, content)?;
        return Ok(());
    }

    anyhow::bail!("ffmpeg binary not found in archive")
}

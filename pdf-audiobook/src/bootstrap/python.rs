//! Portable Python, virtual environment, and Kokoro package installation.

use super::download::download_file;
use super::platform::Platform;
use super::versions::{PYTHON_RELEASE_TAG, PYTHON_VERSION, get_python_dir, get_venv_dir};
use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;

/// Python packages required for Kokoro TTS.
pub const REQUIRED_PACKAGES: &[&str] = &["kokoro>=0.9.4", "soundfile", "misaki[en]"];

/// Get the download URL for the portable Python build.
pub fn get_python_download_url(platform: &Platform) -> String {
    format!(
        "https://github.com/astral-sh/python-build-standalone/releases/download/{tag}/cpython-{version}+{tag}-{arch}-install_only.tar.gz",
        tag = PYTHON_RELEASE_TAG,
        version = PYTHON_VERSION,
        arch = platform.python_platform_string(),
    )
}

/// Root of the extracted Python distribution (the embedded interpreter's PYTHONHOME).
pub fn get_python_home() -> Result<PathBuf> {
    Ok(get_python_dir()?.join("python"))
}

/// Get the path to the Python executable in the bootstrap directory.
pub fn get_python_executable() -> Result<PathBuf> {
    Ok(get_python_home()?.join("bin").join("python3"))
}

/// Get the path to the Python executable in the venv.
pub fn get_venv_python() -> Result<PathBuf> {
    Ok(get_venv_dir()?.join("bin").join("python"))
}

/// Get the venv's site-packages directory, e.g. `venv/lib/python3.11/site-packages`.
pub fn get_venv_site_packages() -> Result<PathBuf> {
    Ok(get_venv_dir()?
        .join("lib")
        .join(format!("python{}", python_minor_version()))
        .join("site-packages"))
}

/// "3.11.11" -> "3.11"
fn python_minor_version() -> String {
    PYTHON_VERSION
        .split('.')
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}

/// Run `python <args>` and report whether it exited successfully.
fn python_succeeds(python: &Path, args: &[&str]) -> Result<bool> {
    if !python.exists() {
        return Ok(false);
    }

    let output = Command::new(python)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", python.display()))?;

    Ok(output.status.success())
}

/// Check if the bootstrapped Python is installed and working.
pub fn is_python_installed() -> Result<bool> {
    python_succeeds(&get_python_executable()?, &["--version"])
}

/// Check if the venv exists and has Python.
pub fn is_venv_ready() -> Result<bool> {
    python_succeeds(&get_venv_python()?, &["--version"])
}

/// Check if Kokoro can be imported from the venv.
pub fn is_kokoro_installed() -> Result<bool> {
    python_succeeds(&get_venv_python()?, &["-c", "import kokoro, soundfile"])
}

/// Download and install the portable Python build.
pub async fn install_python(platform: &Platform) -> Result<PathBuf> {
    let python_dir = get_python_dir()?;
    let url = get_python_download_url(platform);

    let temp_dir = tempfile::tempdir()?;
    let archive_path = temp_dir.path().join("python.tar.gz");

    download_file(
        &url,
        &archive_path,
        &format!("Downloading Python {}...", PYTHON_VERSION),
    )
    .await?;

    eprintln!("  Extracting Python...");
    extract_tar_gz(&archive_path, &python_dir)?;

    let python_path = get_python_executable()?;
    let output = Command::new(&python_path)
        .arg("--version")
        .output()
        .with_context(|| format!("Python not runnable at {}", python_path.display()))?;

    if !output.status.success() {
        anyhow::bail!("Python installation verification failed");
    }

    let version = String::from_utf8_lossy(&output.stdout);
    eprintln!("  Installed {}", version.trim());

    Ok(python_path)
}

/// Create a virtual environment using the bootstrapped Python.
pub fn create_venv() -> Result<()> {
    let python_path = get_python_executable()?;
    let venv_path = get_venv_dir()?;

    eprintln!("  Creating virtual environment...");

    if venv_path.exists() {
        std::fs::remove_dir_all(&venv_path)?;
    }

    let output = Command::new(&python_path)
        .args(["-m", "venv"])
        .arg(&venv_path)
        .output()
        .context("Failed to create virtual environment")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("Failed to create venv: {}", stderr);
    }

    Ok(())
}

/// Install a package into the venv with `python -m pip`.
pub fn pip_install(package: &str, upgrade: bool) -> Result<()> {
    let python = get_venv_python()?;

    let mut cmd = Command::new(&python);
    cmd.args(["-m", "pip", "install"]);
    if upgrade {
        cmd.arg("--upgrade");
    }
    cmd.arg(package);

    let output = cmd
        .output()
        .with_context(|| format!("Failed to install {}", package))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("pip install {} failed: {}", package, stderr);
    }

    Ok(())
}

/// Install all required packages into the venv.
pub fn install_packages(progress_callback: impl Fn(&str)) -> Result<()> {
    progress_callback("Upgrading pip...");
    pip_install("pip", true)?;

    for (i, package) in REQUIRED_PACKAGES.iter().enumerate() {
        progress_callback(&format!(
            "Installing {} ({}/{})...",
            package,
            i + 1,
            REQUIRED_PACKAGES.len()
        ));
        pip_install(package, false)?;
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, destination: &Path) -> Result<()> {
    let file = std::fs::File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));

    std::fs::create_dir_all(destination)?;
    archive
        .unpack(destination)
        .context("Failed to extract tar.gz archive")?;

    Ok(())
}

/// Get environment info for diagnostics.
pub fn get_env_info() -> Result<String> {
    let python_path = get_python_executable()?;
    let venv_python = get_venv_python()?;

    let mut info = String::new();
    info.push_str(&format!("Python: {}\n", python_path.display()));
    info.push_str(&format!("Python exists: {}\n", python_path.exists()));
    info.push_str(&format!("Venv Python: {}\n", venv_python.display()));
    info.push_str(&format!("Venv ready: {}\n", is_venv_ready().unwrap_or(false)));
    info.push_str(&format!(
        "Kokoro installed: {}\n",
        is_kokoro_installed().unwrap_or(false)
    ));

    Ok(info)
}

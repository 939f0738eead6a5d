//! Portable Python for PyO3 builds.
//!
//! Fetches python-build-standalone into `target/python-dev` with `curl` and
//! `tar`, so the runner itself stays dependency-free.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Keep in sync with the runtime bootstrap in pdf-audiobook.
const PYTHON_VERSION: &str = "3.11.11";
const PYTHON_RELEASE_TAG: &str = "20241206";

fn workspace_root() -> Result<PathBuf> {
    let output = Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("Failed to run cargo locate-project")?;

    if !output.status.success() {
        anyhow::bail!("cargo locate-project failed");
    }

    let cargo_toml = String::from_utf8(output.stdout).context("Invalid UTF-8 in cargo output")?;
    Path::new(cargo_toml.trim())
        .parent()
        .map(Path::to_path_buf)
        .context("Workspace manifest has no parent directory")
}

fn python_dev_dir() -> Result<PathBuf> {
    Ok(workspace_root()?.join("target").join("python-dev"))
}

fn python_executable() -> Result<PathBuf> {
    Ok(python_dev_dir()?.join("python").join("bin").join("python3"))
}

/// `<prefix>/lib` for a `<prefix>/bin/python3` executable.
pub fn python_lib_dir(python: &Path) -> Result<PathBuf> {
    python
        .parent()
        .and_then(Path::parent)
        .map(|prefix| prefix.join("lib"))
        .context("Failed to determine Python lib directory")
}

/// `python --version` output, if the interpreter runs at all.
fn python_version(python: &Path) -> Option<String> {
    let output = Command::new(python).arg("--version").output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Make sure a working development Python exists and return its path.
pub fn provision_python() -> Result<PathBuf> {
    let python = python_executable()?;
    if python.exists() && python_version(&python).is_some() {
        eprintln!("Python already provisioned at: {}", python.display());
        return Ok(python);
    }

    let install_dir = python_dev_dir()?;
    std::fs::create_dir_all(&install_dir)?;

    let url = python_url()?;
    eprintln!("Downloading Python {} from {}...", PYTHON_VERSION, url);
    let archive = install_dir.join("python.tar.gz");
    run_tool(
        Command::new("curl")
            .args(["-fSL", "--progress-bar", "-o"])
            .arg(&archive)
            .arg(&url),
        "curl",
    )?;

    eprintln!("Extracting Python...");
    run_tool(
        Command::new("tar").arg("-xzf").arg(&archive).arg("-C").arg(&install_dir),
        "tar",
    )?;
    let _ = std::fs::remove_file(&archive);

    let version = python_version(&python).context("Provisioned Python does not run")?;
    eprintln!("Python provisioned successfully: {}", version);
    Ok(python)
}

fn python_url() -> Result<String> {
    let triple = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "aarch64-apple-darwin",
        ("macos", "x86_64") => "x86_64-apple-darwin",
        ("linux", "x86_64") => "x86_64-unknown-linux-gnu",
        ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
        (os, arch) => anyhow::bail!("No portable Python build for {}-{}", os, arch),
    };
    Ok(format!(
        "https://github.com/astral-sh/python-build-standalone/releases/download/{tag}/cpython-{version}+{tag}-{triple}-install_only.tar.gz",
        tag = PYTHON_RELEASE_TAG,
        version = PYTHON_VERSION,
        triple = triple,
    ))
}

fn run_tool(cmd: &mut Command, name: &str) -> Result<()> {
    let status = cmd
        .status()
        .with_context(|| format!("Failed to run {}", name))?;
    if !status.success() {
        anyhow::bail!("{} exited with {}", name, status);
    }
    Ok(())
}

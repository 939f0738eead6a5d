//! Platform detection for bootstrap downloads.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Unsupported operating system: {0}")]
    UnsupportedOs(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Linux,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Download target for Python and FFmpeg builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    /// Detect the current platform.
    pub fn detect() -> Result<Self, PlatformError> {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Build a platform from Rust's `target_os` / `target_arch` names.
    pub fn from_names(os: &str, arch: &str) -> Result<Self, PlatformError> {
        let os = match os {
            "macos" => Os::MacOs,
            "linux" => Os::Linux,
            other => return Err(PlatformError::UnsupportedOs(other.to_string())),
        };
        let arch = match arch {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => return Err(PlatformError::UnsupportedArch(other.to_string())),
        };
        Ok(Platform { os, arch })
    }

    /// python-build-standalone target triple.
    pub fn python_platform_string(&self) -> &'static str {
        match (self.os, self.arch) {
            (Os::MacOs, Arch::Aarch64) => "aarch64-apple-darwin",
            (Os::MacOs, Arch::X86_64) => "x86_64-apple-darwin",
            (Os::Linux, Arch::X86_64) => "x86_64-unknown-linux-gnu",
            (Os::Linux, Arch::Aarch64) => "aarch64-unknown-linux-gnu",
        }
    }

    /// Key recorded in the versions manifest, e.g. "Linux-x86_64".
    pub fn to_version_string(&self) -> String {
        format!("{}-{}", self.os_name(), self.arch_name())
    }

    fn os_name(&self) -> &'static str {
        match self.os {
            Os::MacOs => "macOS",
            Os::Linux => "Linux",
        }
    }

    fn arch_name(&self) -> &'static str {
        match self.arch {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.os_name(), self.arch_name())
    }
}

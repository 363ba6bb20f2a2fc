//! Core types for executable staging.
//!
//! This module defines the foundational types used across the locator:
//! platform detection, the outcome of a provisioning pass, and the
//! non-fatal error taxonomy collected while staging.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Platform Detection
// ============================================================================

/// Operating-system family, as far as staging cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    /// Windows: executables carry `.exe`, no permission bits.
    Windows,
    /// Everything else: no suffix, needs the execute bit.
    UnixLike,
}

impl OsFamily {
    /// Classifies an OS name. Anything containing "windows" (any case) is
    /// Windows-family.
    pub fn from_os_name(os_name: &str) -> Self {
        if os_name.to_lowercase().contains("windows") {
            Self::Windows
        } else {
            Self::UnixLike
        }
    }

    /// File-name suffix for executables on this family.
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::UnixLike => "",
        }
    }

    /// Returns true if staged files need their permission bits set.
    pub fn needs_chmod(&self) -> bool {
        matches!(self, Self::UnixLike)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::UnixLike => write!(f, "unix"),
        }
    }
}

/// The (OS family, architecture) pair that selects a bundled binary.
///
/// The architecture string is kept verbatim; it becomes part of both the
/// resource name and the staged file name without any validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlatformKey {
    pub os: OsFamily,
    pub arch: String,
}

impl PlatformKey {
    pub fn new(os: OsFamily, arch: impl Into<String>) -> Self {
        Self {
            os,
            arch: arch.into(),
        }
    }

    /// Builds a key from raw OS name and architecture strings.
    pub fn from_parts(os_name: &str, arch: &str) -> Self {
        Self::new(OsFamily::from_os_name(os_name), arch)
    }

    /// Detects the key of the running process.
    ///
    /// The architecture is Rust's own name for it (`std::env::consts::ARCH`),
    /// so bundles must be named `ffmpeg-x86_64`, `ffmpeg-aarch64`, `ffmpeg-x86`
    /// and so on. Packages built for JVM launchers use `amd64`, `arm64` or
    /// `i386` instead; rename those binaries, or override the key with
    /// [`ExecutableProvisioner::with_platform`](super::ExecutableProvisioner::with_platform).
    pub fn detect() -> Self {
        Self::from_parts(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// File name of the executable for `tool` on this platform.
    ///
    /// e.g., `ffmpeg-x86_64` or `ffmpeg-x86_64.exe`
    pub fn executable_file_name(&self, tool: &str) -> String {
        format!("{}-{}{}", tool, self.arch, self.os.exe_suffix())
    }

    /// Name of the bundled resource for `tool`, relative to the resource root.
    ///
    /// e.g., `native/ffmpeg-x86_64`
    pub fn resource_name(&self, prefix: &str, tool: &str) -> String {
        let file_name = self.executable_file_name(tool);
        if prefix.is_empty() {
            file_name
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }
}

impl fmt::Display for PlatformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

// ============================================================================
// Provisioning Errors
// ============================================================================

/// Problems hit while staging. None of these are ever returned to the
/// caller of the path accessor; they are logged and collected in a
/// [`ProvisionReport`].
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("Bundled resource not found: {name}")]
    ResourceNotFound { name: String },

    #[error("Failed to create staging directory {}: {source}", path.display())]
    StagingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to copy executable to {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set executable permission on {}: {source}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

// ============================================================================
// Provisioning Outcome
// ============================================================================

/// What a provisioning pass did with the target file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    /// An existing file was kept.
    Reused,
    /// The bundled resource was copied into place.
    Staged,
    /// No usable file could be produced.
    Failed,
}

/// Result of one provisioning pass. The path is always set, even when
/// nothing usable exists there.
#[derive(Debug)]
pub struct ProvisionReport {
    pub path: PathBuf,
    pub action: StageAction,
    pub issues: Vec<ProvisioningError>,
}

impl ProvisionReport {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            action: StageAction::Failed,
            issues: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if an executable file is in place.
    ///
    /// Permission failures don't count against readiness; the file may
    /// already carry usable bits from packaging.
    pub fn is_ready(&self) -> bool {
        self.action != StageAction::Failed && self.path.is_file()
    }

    /// Returns true if any non-fatal problem was recorded.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

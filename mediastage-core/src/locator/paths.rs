//! Staging path layout.
//!
//! Staged executables live under a version-namespaced directory inside the
//! temp root (the OS temp directory unless configured otherwise):
//!
//! - Linux: `/tmp/ffmpeg-2/ffmpeg-x86_64`
//! - macOS: `/var/folders/.../T/ffmpeg-2/ffmpeg-aarch64`
//! - Windows: `C:\Users\<User>\AppData\Local\Temp\ffmpeg-2\ffmpeg-x86_64.exe`
//!
//! Bumping the version tag moves everything to a fresh directory, so a
//! binary staged by an older revision is never picked up.

use std::path::{Path, PathBuf};

use super::types::{PlatformKey, ProvisioningError};

// ============================================================================
// Path Resolution
// ============================================================================

/// Name of the staging directory for a tool revision, e.g. `ffmpeg-2`.
pub fn staging_dir_name(tool: &str, version_tag: u32) -> String {
    format!("{}-{}", tool, version_tag)
}

/// Returns the staging directory for a tool revision.
///
/// Path: `{temp_root}/{tool}-{version_tag}/`
pub fn staging_dir(temp_root: &Path, tool: &str, version_tag: u32) -> PathBuf {
    temp_root.join(staging_dir_name(tool, version_tag))
}

/// Returns the absolute path of the staged executable.
///
/// Path: `{temp_root}/{tool}-{version_tag}/{tool}-{arch}[.exe]`
pub fn staged_executable_path(
    temp_root: &Path,
    tool: &str,
    version_tag: u32,
    platform: &PlatformKey,
) -> PathBuf {
    let path = staging_dir(temp_root, tool, version_tag).join(platform.executable_file_name(tool));
    std::path::absolute(&path).unwrap_or(path)
}

/// Parses the version tag out of a staging directory name.
///
/// Returns `None` for names that don't belong to `tool`, so a sibling such
/// as `ffmpeg-cache` is never mistaken for a staging directory.
pub fn parse_version_tag(dir_name: &str, tool: &str) -> Option<u32> {
    dir_name
        .strip_prefix(tool)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Ensures the staging directory exists. An existing directory is fine.
///
/// # Errors
///
/// Returns [`ProvisioningError::StagingDir`] if the directory cannot be
/// created (e.g., permission issues).
pub fn ensure_staging_dir(dir: &Path) -> Result<(), ProvisioningError> {
    std::fs::create_dir_all(dir).map_err(|source| ProvisioningError::StagingDir {
        path: dir.to_path_buf(),
        source,
    })
}

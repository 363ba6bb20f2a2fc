//! Copying bundled executables into place.
//!
//! Every copy goes to a uniquely named temporary file in the staging
//! directory and is then renamed over the target. Concurrent stagers
//! therefore race on the rename only, and the target is always one
//! complete copy.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use super::resources::ResourceSource;
use super::types::ProvisioningError;
use crate::config::IntegrityCheck;

/// Mode applied to staged executables on Unix.
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Temp files older than this are assumed to belong to a stager that died.
pub const STALE_PARTIAL_AGE: Duration = Duration::from_secs(10 * 60);

// ============================================================================
// Staging Copy
// ============================================================================

/// Copies resource `name` to `target`, replacing whatever is there.
///
/// # Returns
///
/// The number of bytes written.
///
/// # Errors
///
/// - [`ProvisioningError::ResourceNotFound`] if the source has no such resource.
/// - [`ProvisioningError::Copy`] if reading, writing or the final rename fails.
pub fn stage_resource(
    resources: &dyn ResourceSource,
    name: &str,
    target: &Path,
) -> Result<u64, ProvisioningError> {
    let copy_err = |source: io::Error| ProvisioningError::Copy {
        path: target.to_path_buf(),
        source,
    };

    let mut reader = resources
        .open(name)
        .map_err(copy_err)?
        .ok_or_else(|| ProvisioningError::ResourceNotFound {
            name: name.to_string(),
        })?;

    let dir = target.parent().ok_or_else(|| {
        copy_err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "target has no parent directory",
        ))
    })?;

    let file_name = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut partial = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(copy_err)?;

    let bytes = io::copy(&mut reader, partial.as_file_mut()).map_err(copy_err)?;
    partial.as_file().sync_all().map_err(copy_err)?;

    partial
        .persist(target)
        .map_err(|e| copy_err(e.error))?;

    debug!("Wrote {} bytes to {}", bytes, target.display());
    Ok(bytes)
}

/// Deletes temporary copies of `target` left behind by interrupted stagers.
///
/// Only files last modified more than `max_age` ago are touched, so copies
/// still being written by a live stager survive. Returns the removed paths.
pub fn remove_stale_partials(target: &Path, max_age: Duration) -> Vec<PathBuf> {
    let (Some(dir), Some(file_name)) = (target.parent(), target.file_name()) else {
        return Vec::new();
    };

    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy()))
        .join(format!(
            ".{}.*.partial",
            glob::Pattern::escape(&file_name.to_string_lossy())
        ))
        .to_string_lossy()
        .into_owned();

    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Invalid partial-file pattern {}: {}", pattern, e);
            return Vec::new();
        }
    };

    let now = SystemTime::now();
    let mut removed = Vec::new();

    for path in entries.filter_map(|e| e.ok()) {
        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        match age {
            Some(age) if age >= max_age => {
                if let Err(e) = fs::remove_file(&path) {
                    warn!("Failed to remove stale {}: {}", path.display(), e);
                    continue;
                }
                debug!("Removed stale partial copy {}", path.display());
                removed.push(path);
            }
            _ => {}
        }
    }

    removed
}

// ============================================================================
// Integrity
// ============================================================================

/// Decides whether an existing staged file can be reused.
///
/// When the resource itself is unavailable there is nothing to compare
/// against, so the existing file is kept.
pub fn is_intact(
    resources: &dyn ResourceSource,
    name: &str,
    target: &Path,
    check: IntegrityCheck,
) -> bool {
    match check {
        IntegrityCheck::Trust => true,
        IntegrityCheck::Size => {
            let Some(expected) = resources.byte_len(name) else {
                return true;
            };
            match fs::metadata(target) {
                Ok(meta) => meta.len() == expected,
                Err(e) => {
                    debug!("Cannot stat {}: {}", target.display(), e);
                    false
                }
            }
        }
        IntegrityCheck::Sha256 => match sha256_matches(resources, name, target) {
            Ok(matches) => matches,
            Err(e) => {
                debug!("Cannot hash {}: {}", target.display(), e);
                false
            }
        },
    }
}

fn sha256_matches(resources: &dyn ResourceSource, name: &str, target: &Path) -> io::Result<bool> {
    let Some(mut reader) = resources.open(name)? else {
        return Ok(true);
    };
    let expected = sha256_hex(&mut reader)?;

    let mut file = fs::File::open(target)?;
    let actual = sha256_hex(&mut file)?;

    if actual != expected {
        debug!(
            "SHA256 mismatch for {}\nExpected: {}\nActual: {}",
            target.display(),
            expected,
            actual
        );
    }
    Ok(actual == expected)
}

/// Streams a reader through SHA-256 and returns the lowercase hex digest.
pub fn sha256_hex<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(reader, &mut hasher)?;
    Ok(format_sha256_hex(&hasher.finalize()))
}

fn format_sha256_hex(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Permissions
// ============================================================================

/// Ensures a file carries [`EXECUTABLE_MODE`] (Unix only).
///
/// Returns true if the permissions were changed. On Windows this is a no-op.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> Result<bool, ProvisioningError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perm_err = |source: io::Error| ProvisioningError::Permissions {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(path).map_err(perm_err)?;
        let mut permissions = metadata.permissions();
        let current_mode = permissions.mode();

        if current_mode & EXECUTABLE_MODE == EXECUTABLE_MODE {
            return Ok(false);
        }

        permissions.set_mode(current_mode | EXECUTABLE_MODE);
        fs::set_permissions(path, permissions).map_err(perm_err)?;

        debug!("Set executable permission on {}", path.display());
        Ok(true)
    }

    #[cfg(not(unix))]
    {
        Ok(false)
    }
}

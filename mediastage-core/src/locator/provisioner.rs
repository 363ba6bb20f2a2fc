//! Executable provisioner.
//!
//! The `ExecutableProvisioner` is the main entry point of the locator. It
//! ties the platform key, the configured resource source and the staging
//! layout together, and hands out the path of a ready-to-run executable.
//!
//! Provisioning never fails from the caller's point of view. Problems are
//! logged and collected in a [`ProvisionReport`]; the real failure surfaces
//! later, when the caller tries to run a path with nothing usable behind it.

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::paths;
use super::resources::{EmbeddedResources, ResourceSource};
use super::stager;
use super::types::{PlatformKey, ProvisionReport, StageAction};
use crate::config::ProvisionerConfig;

// ============================================================================
// Executable Provisioner
// ============================================================================

/// Stages a bundled executable and reports where it lives.
///
/// Thread-safe; share it behind an `Arc` or a `static`.
pub struct ExecutableProvisioner {
    config: ProvisionerConfig,
    platform: PlatformKey,
    resources: Arc<dyn ResourceSource>,
    /// Computed on first use and fixed for the lifetime of the provisioner.
    path: OnceLock<PathBuf>,
}

impl ExecutableProvisioner {
    /// Creates a provisioner backed by the executables embedded at build time.
    pub fn new(config: ProvisionerConfig) -> Self {
        Self::with_resources(config, Arc::new(EmbeddedResources::bundled()))
    }

    /// Creates a provisioner reading from a custom resource source.
    pub fn with_resources(mut config: ProvisionerConfig, resources: Arc<dyn ResourceSource>) -> Self {
        config.validate();
        let platform = PlatformKey::detect();

        info!(
            "ExecutableProvisioner initialized. Tool: {} (rev {}), Platform: {}, Resources: {}",
            config.tool_name,
            config.version_tag,
            platform,
            resources.describe()
        );

        Self {
            config,
            platform,
            resources,
            path: OnceLock::new(),
        }
    }

    /// Replaces the detected platform key (for cross-platform packaging and tests).
    pub fn with_platform(mut self, platform: PlatformKey) -> Self {
        self.platform = platform;
        self.path = OnceLock::new();
        self
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformKey {
        &self.platform
    }

    pub fn resources(&self) -> &dyn ResourceSource {
        self.resources.as_ref()
    }

    /// Name of the bundled resource for this platform, e.g. `native/ffmpeg-x86_64`.
    pub fn resource_name(&self) -> String {
        self.platform
            .resource_name(&self.config.resource_prefix, &self.config.tool_name)
    }

    /// Returns true if the resource source has a binary for this platform.
    pub fn has_bundled_executable(&self) -> bool {
        self.resources.contains(&self.resource_name())
    }

    /// Directory holding this revision's staged files.
    pub fn staging_dir(&self) -> PathBuf {
        paths::staging_dir(
            &self.config.temp_root(),
            &self.config.tool_name,
            self.config.version_tag,
        )
    }

    /// Absolute path the executable is staged at. Pure computation; touches
    /// nothing on disk.
    pub fn target_path(&self) -> &Path {
        self.path.get_or_init(|| {
            paths::staged_executable_path(
                &self.config.temp_root(),
                &self.config.tool_name,
                self.config.version_tag,
                &self.platform,
            )
        })
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    /// Resolves the executable path, staging the binary if needed.
    ///
    /// Always returns the same path. Each call checks the file is still
    /// there and re-stages it if it went missing.
    pub fn resolve_executable_path(&self) -> &Path {
        let report = self.provision();

        if report.is_ready() {
            debug!(
                "{} ready at {} ({:?})",
                self.config.tool_name,
                report.path.display(),
                report.action
            );
        } else {
            warn!(
                "{} is not available at {}; running it will fail",
                self.config.tool_name,
                report.path.display()
            );
        }

        self.target_path()
    }

    /// Runs one provisioning pass and reports what happened.
    pub fn provision(&self) -> ProvisionReport {
        let target = self.target_path().to_path_buf();
        let name = self.resource_name();
        let mut report = ProvisionReport::new(target.clone());

        if let Some(dir) = target.parent() {
            if let Err(e) = paths::ensure_staging_dir(dir) {
                warn!("{}", e);
                report.issues.push(e);
                return report;
            }
        }

        let swept = stager::remove_stale_partials(&target, stager::STALE_PARTIAL_AGE);
        if !swept.is_empty() {
            info!(
                "Removed {} abandoned partial copies next to {}",
                swept.len(),
                target.display()
            );
        }

        let reusable = target.is_file()
            && stager::is_intact(self.resources(), &name, &target, self.config.integrity);

        if reusable {
            debug!("Reusing staged executable at {}", target.display());
            report.action = StageAction::Reused;
        } else {
            if target.exists() {
                info!(
                    "Staged file at {} failed the {} check, replacing it",
                    target.display(),
                    self.config.integrity
                );
            }

            match stager::stage_resource(self.resources(), &name, &target) {
                Ok(bytes) => {
                    info!("Staged {} ({} bytes) at {}", name, bytes, target.display());
                    report.action = StageAction::Staged;
                }
                Err(e) => {
                    warn!("{}", e);
                    report.issues.push(e);
                }
            }
        }

        if report.action != StageAction::Failed && self.platform.os.needs_chmod() {
            if let Err(e) = stager::make_executable(&target) {
                warn!("{}", e);
                report.issues.push(e);
            }
        }

        report
    }

    // ========================================================================
    // Housekeeping
    // ========================================================================

    /// Deletes this revision's staging directory.
    ///
    /// Returns false if there was nothing to delete.
    pub fn remove_staged(&self) -> Result<bool> {
        let dir = self.staging_dir();
        if !dir.exists() {
            return Ok(false);
        }

        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;

        info!("Removed staging directory {}", dir.display());
        Ok(true)
    }

    /// Deletes staging directories left behind by other revisions of the
    /// same tool. Returns the directories that were removed.
    pub fn prune_stale_versions(&self) -> Result<Vec<PathBuf>> {
        let root = self.config.temp_root();
        let tool = &self.config.tool_name;

        let pattern = Path::new(&glob::Pattern::escape(&root.to_string_lossy()))
            .join(format!("{}-*", glob::Pattern::escape(tool)));
        let pattern = pattern.to_string_lossy();

        let mut removed = Vec::new();

        for entry in glob::glob(&pattern).context("Invalid staging directory pattern")? {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping unreadable entry while pruning: {}", e);
                    continue;
                }
            };

            if !path.is_dir() {
                continue;
            }

            let tag = path
                .file_name()
                .and_then(|s| s.to_str())
                .and_then(|name| paths::parse_version_tag(name, tool));

            match tag {
                Some(tag) if tag != self.config.version_tag => {
                    if let Err(e) = std::fs::remove_dir_all(&path) {
                        warn!("Failed to remove stale {}: {}", path.display(), e);
                        continue;
                    }
                    info!("Removed stale staging directory {}", path.display());
                    removed.push(path);
                }
                _ => {}
            }
        }

        Ok(removed)
    }
}

impl fmt::Debug for ExecutableProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableProvisioner")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("resources", &self.resources.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegrityCheck;
    use crate::locator::resources::DirectoryResources;
    use crate::locator::types::{OsFamily, ProvisioningError};
    use std::fs;
    use std::sync::Barrier;
    use tempfile::TempDir;

    static TABLE: &[(&str, &[u8])] = &[
        ("native/ffmpeg-testarch", b"pretend this is an ELF binary"),
        ("native/ffmpeg-testarch.exe", b"pretend this is a PE binary"),
    ];

    fn provisioner(temp_root: &Path, version_tag: u32) -> ExecutableProvisioner {
        let config = ProvisionerConfig::default()
            .with_temp_root(temp_root)
            .with_version_tag(version_tag);
        ExecutableProvisioner::with_resources(config, Arc::new(EmbeddedResources::new(TABLE)))
            .with_platform(PlatformKey::new(OsFamily::UnixLike, "testarch"))
    }

    #[test]
    fn test_provisioner_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ExecutableProvisioner>();
    }

    #[test]
    fn test_target_path_layout() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.target_path();
        assert!(path.is_absolute());
        assert!(path.ends_with("ffmpeg-2/ffmpeg-testarch"));
        assert_eq!(prov.resource_name(), "native/ffmpeg-testarch");
        assert!(prov.has_bundled_executable());
        assert!(!path.exists(), "computing the path must not touch disk");
    }

    #[test]
    fn test_resolve_stages_executable() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.resolve_executable_path().to_path_buf();

        assert!(path.is_file());
        assert_eq!(fs::read(&path).unwrap(), b"pretend this is an ELF binary");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let first = prov.provision();
        assert_eq!(first.action, StageAction::Staged);
        let mtime_before = fs::metadata(&first.path).unwrap().modified().unwrap();

        let second = prov.provision();
        assert_eq!(second.action, StageAction::Reused);
        assert_eq!(first.path, second.path);

        let mtime_after = fs::metadata(&second.path).unwrap().modified().unwrap();
        assert_eq!(mtime_before, mtime_after);

        assert_eq!(prov.resolve_executable_path(), prov.resolve_executable_path());
    }

    #[test]
    fn test_existing_file_reused_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        let first = provisioner(temp_dir.path(), 2).provision();
        assert_eq!(first.action, StageAction::Staged);

        let second = provisioner(temp_dir.path(), 2).provision();
        assert_eq!(second.action, StageAction::Reused);
        assert_eq!(first.path, second.path);
    }

    #[test]
    fn test_deleted_file_is_restaged() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.resolve_executable_path().to_path_buf();
        fs::remove_file(&path).unwrap();
        assert!(!path.exists());

        let again = prov.resolve_executable_path();
        assert_eq!(again, path.as_path());
        assert_eq!(fs::read(&path).unwrap(), b"pretend this is an ELF binary");
    }

    #[test]
    fn test_deleted_staging_dir_is_recreated() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        prov.resolve_executable_path();
        fs::remove_dir_all(prov.staging_dir()).unwrap();

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Staged);
        assert!(report.is_ready());
    }

    #[test]
    fn test_missing_resource_still_returns_path() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2)
            .with_platform(PlatformKey::new(OsFamily::UnixLike, "sparc64"));

        let path = prov.resolve_executable_path().to_path_buf();
        assert!(path.ends_with("ffmpeg-2/ffmpeg-sparc64"));
        assert!(!path.exists());

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Failed);
        assert!(!report.is_ready());
        assert!(matches!(
            report.issues.as_slice(),
            [ProvisioningError::ResourceNotFound { name }] if name == "native/ffmpeg-sparc64"
        ));
    }

    #[test]
    fn test_unwritable_temp_root_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"file, not a directory").unwrap();

        let prov = provisioner(&blocker, 2);
        let report = prov.provision();

        assert_eq!(report.action, StageAction::Failed);
        assert!(matches!(
            report.issues.as_slice(),
            [ProvisioningError::StagingDir { .. }]
        ));
        // Still hands out the computed path.
        assert_eq!(prov.resolve_executable_path(), report.path.as_path());
    }

    #[test]
    fn test_windows_family_uses_exe_suffix() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2)
            .with_platform(PlatformKey::new(OsFamily::Windows, "testarch"));

        let path = prov.resolve_executable_path();
        assert!(path.ends_with("ffmpeg-2/ffmpeg-testarch.exe"));
        assert_eq!(fs::read(path).unwrap(), b"pretend this is a PE binary");
    }

    #[cfg(unix)]
    #[test]
    fn test_staged_file_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.resolve_executable_path();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_ne!(mode & 0o100, 0, "owner execute bit missing: {:o}", mode);
        assert_eq!(mode & 0o755, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_reused_file_regains_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.resolve_executable_path().to_path_buf();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Reused);
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    #[cfg(unix)]
    #[test]
    fn test_windows_family_skips_chmod() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2)
            .with_platform(PlatformKey::new(OsFamily::Windows, "testarch"));

        let path = prov.resolve_executable_path();
        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }

    #[test]
    fn test_version_tags_do_not_share_files() {
        let temp_dir = TempDir::new().unwrap();
        let old = provisioner(temp_dir.path(), 1);
        let new = provisioner(temp_dir.path(), 2);

        let old_path = old.resolve_executable_path();
        let new_report = new.provision();

        assert_ne!(old_path, new_report.path.as_path());
        assert_ne!(old.staging_dir(), new.staging_dir());
        assert_eq!(new_report.action, StageAction::Staged);
    }

    #[test]
    fn test_truncated_file_is_restaged_by_size_check() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        let path = prov.resolve_executable_path().to_path_buf();
        fs::write(&path, b"pretend").unwrap();

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Staged);
        assert_eq!(fs::read(&path).unwrap(), b"pretend this is an ELF binary");
    }

    #[test]
    fn test_trust_mode_keeps_truncated_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = ProvisionerConfig::default()
            .with_temp_root(temp_dir.path())
            .with_integrity(IntegrityCheck::Trust);
        let prov =
            ExecutableProvisioner::with_resources(config, Arc::new(EmbeddedResources::new(TABLE)))
                .with_platform(PlatformKey::new(OsFamily::UnixLike, "testarch"));

        let path = prov.resolve_executable_path().to_path_buf();
        fs::write(&path, b"pretend").unwrap();

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Reused);
        assert_eq!(fs::read(&path).unwrap(), b"pretend");
    }

    #[test]
    fn test_sha256_mode_restages_tampered_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = ProvisionerConfig::default()
            .with_temp_root(temp_dir.path())
            .with_integrity(IntegrityCheck::Sha256);
        let prov =
            ExecutableProvisioner::with_resources(config, Arc::new(EmbeddedResources::new(TABLE)))
                .with_platform(PlatformKey::new(OsFamily::UnixLike, "testarch"));

        let path = prov.resolve_executable_path().to_path_buf();
        // Same length, different bytes.
        fs::write(&path, b"PRETEND THIS IS AN ELF BINARY").unwrap();

        let report = prov.provision();
        assert_eq!(report.action, StageAction::Staged);
        assert_eq!(fs::read(&path).unwrap(), b"pretend this is an ELF binary");
    }

    #[test]
    fn test_concurrent_resolution_produces_one_complete_file() {
        let temp_dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();

        let res_root = temp_dir.path().join("res");
        fs::create_dir_all(res_root.join("native")).unwrap();
        fs::write(res_root.join("native/ffmpeg-testarch"), &payload).unwrap();

        let stage_root = temp_dir.path().join("stage");
        let threads = 8;
        let barrier = Barrier::new(threads);

        let paths: Vec<PathBuf> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(|| {
                        let config = ProvisionerConfig::default().with_temp_root(&stage_root);
                        let prov = ExecutableProvisioner::with_resources(
                            config,
                            Arc::new(DirectoryResources::new(&res_root)),
                        )
                        .with_platform(PlatformKey::new(OsFamily::UnixLike, "testarch"));

                        barrier.wait();
                        prov.resolve_executable_path().to_path_buf()
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(paths.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(fs::read(&paths[0]).unwrap(), payload);

        let entries: Vec<_> = fs::read_dir(paths[0].parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1, "unexpected leftovers: {:?}", entries);
    }

    #[test]
    fn test_shared_provisioner_across_threads() {
        let temp_dir = TempDir::new().unwrap();
        let prov = Arc::new(provisioner(temp_dir.path(), 2));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let prov = Arc::clone(&prov);
                std::thread::spawn(move || prov.resolve_executable_path().to_path_buf())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), prov.target_path());
        }
        assert_eq!(
            fs::read(prov.target_path()).unwrap(),
            b"pretend this is an ELF binary"
        );
    }

    #[test]
    fn test_remove_staged() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);

        assert!(!prov.remove_staged().unwrap());

        prov.resolve_executable_path();
        assert!(prov.staging_dir().exists());

        assert!(prov.remove_staged().unwrap());
        assert!(!prov.staging_dir().exists());
    }

    #[test]
    fn test_prune_stale_versions() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        provisioner(root, 1).resolve_executable_path();
        provisioner(root, 3).resolve_executable_path();
        let current = provisioner(root, 2);
        current.resolve_executable_path();

        fs::create_dir_all(root.join("ffmpeg-cache")).unwrap();
        fs::create_dir_all(root.join("ffprobe-1")).unwrap();
        fs::write(root.join("ffmpeg-4"), b"a file, not a staging dir").unwrap();

        let mut removed = current.prune_stale_versions().unwrap();
        removed.sort();

        assert_eq!(removed, vec![root.join("ffmpeg-1"), root.join("ffmpeg-3")]);
        assert!(current.staging_dir().exists());
        assert!(current.target_path().exists());
        assert!(root.join("ffmpeg-cache").exists());
        assert!(root.join("ffprobe-1").exists());
        assert!(root.join("ffmpeg-4").exists());
    }

    #[test]
    fn test_abandoned_partial_copy_is_swept() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);
        let dir = prov.target_path().parent().unwrap().to_path_buf();
        fs::create_dir_all(&dir).unwrap();

        let abandoned = dir.join(".ffmpeg-testarch.abc123.partial");
        fs::write(&abandoned, b"half a bin").unwrap();
        let file = fs::OpenOptions::new().write(true).open(&abandoned).unwrap();
        file.set_modified(std::time::SystemTime::now() - std::time::Duration::from_secs(3600))
            .unwrap();
        drop(file);

        prov.resolve_executable_path();

        assert!(!abandoned.exists());
        assert!(prov.target_path().is_file());
    }

    #[test]
    fn test_tool_name_cannot_escape_temp_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(temp_dir.path().join("escaped-1")).unwrap();

        let config = ProvisionerConfig::for_tool("../escaped").with_temp_root(&root);
        let prov =
            ExecutableProvisioner::with_resources(config, Arc::new(EmbeddedResources::new(TABLE)))
                .with_platform(PlatformKey::new(OsFamily::UnixLike, "testarch"));

        assert_eq!(prov.config().tool_name, "ffmpeg");
        assert!(prov.resolve_executable_path().starts_with(&root));
        assert!(!temp_dir.path().join("escaped-2").exists());

        assert!(prov.prune_stale_versions().unwrap().is_empty());
        assert!(temp_dir.path().join("escaped-1").exists());
    }

    #[test]
    fn test_debug_does_not_dump_resources() {
        let temp_dir = TempDir::new().unwrap();
        let prov = provisioner(temp_dir.path(), 2);
        let debug = format!("{:?}", prov);
        assert!(debug.contains("ExecutableProvisioner"));
        assert!(debug.contains("embedded (2 entries)"));
    }
}

//! Provisioner settings.
//!
//! Settings are plain data handed to the provisioner at construction time.
//! They can be persisted as JSON; missing fields fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

// =============================================================================
// Defaults
// =============================================================================

/// Executable bundled by default.
pub const DEFAULT_TOOL_NAME: &str = "ffmpeg";

/// Revision of the bundled executables. Bump whenever a bundled binary
/// changes so previously staged copies are never reused.
pub const DEFAULT_VERSION_TAG: u32 = 2;

/// Directory the bundled executables live under, relative to the resource root.
pub const DEFAULT_RESOURCE_PREFIX: &str = "native";

// =============================================================================
// Integrity Check
// =============================================================================

/// How much an already-staged file is trusted before reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityCheck {
    /// Reuse any existing file.
    Trust,
    /// Reuse only if the length matches the bundled resource.
    #[default]
    Size,
    /// Reuse only if the SHA-256 digest matches the bundled resource.
    Sha256,
}

impl IntegrityCheck {
    pub fn all() -> &'static [IntegrityCheck] {
        &[Self::Trust, Self::Size, Self::Sha256]
    }
}

impl std::fmt::Display for IntegrityCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trust => write!(f, "trust"),
            Self::Size => write!(f, "size"),
            Self::Sha256 => write!(f, "sha256"),
        }
    }
}

// =============================================================================
// Provisioner Config
// =============================================================================

/// Everything that namespaces and locates a staged executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Tool name; prefixes both the staging directory and the file name.
    pub tool_name: String,

    /// Bundled-binary revision, embedded in the staging directory name.
    pub version_tag: u32,

    /// Resource directory holding the per-platform executables.
    pub resource_prefix: String,

    /// Parent of the staging directory. `None` means the OS temp directory.
    pub temp_root: Option<PathBuf>,

    /// Verification applied to an existing staged file.
    pub integrity: IntegrityCheck,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            version_tag: DEFAULT_VERSION_TAG,
            resource_prefix: DEFAULT_RESOURCE_PREFIX.to_string(),
            temp_root: None,
            integrity: IntegrityCheck::default(),
        }
    }
}

impl ProvisionerConfig {
    /// Config for an arbitrary tool with default everything else.
    pub fn for_tool(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            ..Self::default()
        }
    }

    pub fn with_version_tag(mut self, version_tag: u32) -> Self {
        self.version_tag = version_tag;
        self
    }

    pub fn with_temp_root(mut self, temp_root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(temp_root.into());
        self
    }

    pub fn with_integrity(mut self, integrity: IntegrityCheck) -> Self {
        self.integrity = integrity;
        self
    }

    pub fn with_resource_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.resource_prefix = prefix.into();
        self
    }

    /// Normalizes fields so they are usable as path components.
    pub fn validate(&mut self) {
        let tool = self.tool_name.trim();
        self.tool_name = if tool.is_empty() {
            DEFAULT_TOOL_NAME.to_string()
        } else if !is_single_path_component(tool) {
            warn!(
                "Tool name {:?} is not a plain file name, using {}",
                tool, DEFAULT_TOOL_NAME
            );
            DEFAULT_TOOL_NAME.to_string()
        } else {
            tool.to_string()
        };

        let prefix = self.resource_prefix.trim().trim_matches('/');
        self.resource_prefix = if prefix.is_empty() {
            DEFAULT_RESOURCE_PREFIX.to_string()
        } else {
            prefix.to_string()
        };
    }

    /// Resolved parent of the staging directory.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// True if `name` is one normal path component on every platform.
fn is_single_path_component(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// =============================================================================
// Persistence
// =============================================================================

/// Loads a config from a JSON file.
///
/// A missing file yields defaults. A file that exists but doesn't parse
/// logs a warning and also yields defaults.
pub fn load_config_from(path: &Path) -> Result<ProvisionerConfig> {
    if !path.exists() {
        debug!("Config not found at {}, using defaults", path.display());
        return Ok(ProvisionerConfig::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;

    let mut config = match serde_json::from_str::<ProvisionerConfig>(&content) {
        Ok(config) => config,
        Err(e) => {
            warn!(
                "Failed to parse config at {}: {}. Using defaults.",
                path.display(),
                e
            );
            ProvisionerConfig::default()
        }
    };

    config.validate();
    Ok(config)
}

/// Saves a config as pretty JSON, creating parent directories.
pub fn save_config_to(config: &ProvisionerConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create config directory: {}", parent.display())
        })?;
    }

    let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

    fs::write(path, content)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    debug!("Config saved to {}", path.display());
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

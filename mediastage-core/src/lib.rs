//! mediastage Core Library
//!
//! This crate ships precompiled media transcoder executables inside a Rust
//! library and stages them on disk so a host application can run them as a
//! subprocess. It includes:
//!
//! - Platform detection (OS family + CPU architecture)
//! - Embedded and on-disk sources for bundled executables
//! - Overwrite-safe staging into a version-namespaced temp directory
//! - Configuration with JSON persistence

pub mod config;
pub mod locator;

// Re-exports for convenience
pub use config::{
    load_config_from, save_config_to, IntegrityCheck, ProvisionerConfig, DEFAULT_RESOURCE_PREFIX,
    DEFAULT_TOOL_NAME, DEFAULT_VERSION_TAG,
};

pub use locator::{
    DirectoryResources, EmbeddedResources, ExecutableLocator, ExecutableProvisioner,
    FixedLocator, OsFamily, PlatformKey, ProvisionReport, ProvisioningError, ResourceSource,
    StageAction,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

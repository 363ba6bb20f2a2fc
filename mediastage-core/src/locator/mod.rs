//! Locating and staging the bundled transcoder executable.
//!
//! Precompiled executables are bundled per platform and copied on demand to
//! a version-namespaced directory in the OS temp folder, where they can be
//! run as a subprocess.
//!
//! # Architecture
//!
//! - `types`: Core types (OsFamily, PlatformKey, ProvisionReport, ProvisioningError)
//! - `paths`: Staging directory layout
//! - `resources`: Where bundled executables are read from
//! - `stager`: Overwrite-safe copying, integrity checks, permissions
//! - `provisioner`: High-level API that ties it together
//! - `command`: Locator trait for process launchers
//!
//! # Example
//!
//! ```ignore
//! use mediastage_core::{ExecutableLocator, ExecutableProvisioner, ProvisionerConfig};
//!
//! let ffmpeg = ExecutableProvisioner::new(ProvisionerConfig::default());
//!
//! // Stages the binary on first use; later calls reuse it.
//! let status = ffmpeg.command().arg("-version").status()?;
//! ```

pub mod command;
pub mod paths;
pub mod provisioner;
pub mod resources;
pub mod stager;
pub mod types;

// Re-export commonly used types
pub use command::{ExecutableLocator, FixedLocator};
pub use paths::{staged_executable_path, staging_dir};
pub use provisioner::ExecutableProvisioner;
pub use resources::{DirectoryResources, EmbeddedResources, ResourceSource};
pub use types::{OsFamily, PlatformKey, ProvisionReport, ProvisioningError, StageAction};

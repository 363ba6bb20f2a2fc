//! Handing the located executable to a process launcher.
//!
//! Callers that only need "the transcoder" should depend on
//! [`ExecutableLocator`] rather than on the provisioner, so a system-installed
//! binary can be swapped in with [`FixedLocator`] where no bundled build exists.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::provisioner::ExecutableProvisioner;

/// Something that knows where the transcoder executable is.
pub trait ExecutableLocator: Send + Sync {
    /// Absolute path of the executable. Never fails; a path with nothing
    /// behind it fails when spawned.
    fn executable_path(&self) -> PathBuf;

    /// A command pointed at the executable. Not spawned.
    fn command(&self) -> Command {
        Command::new(self.executable_path())
    }
}

impl ExecutableLocator for ExecutableProvisioner {
    fn executable_path(&self) -> PathBuf {
        self.resolve_executable_path().to_path_buf()
    }
}

/// Locator for an executable the caller already has on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedLocator {
    path: PathBuf,
}

impl FixedLocator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExecutableLocator for FixedLocator {
    fn executable_path(&self) -> PathBuf {
        self.path.clone()
    }
}

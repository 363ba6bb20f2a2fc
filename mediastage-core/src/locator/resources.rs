//! Sources of bundled executables.
//!
//! A resource is addressed by a slash-separated name relative to a resource
//! root, e.g. `native/ffmpeg-x86_64`. The default source is the table that
//! `build.rs` embeds into the library; a directory on disk can stand in for
//! it when binaries ship alongside the application instead.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::warn;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/bundled_native.rs"));
}

// ============================================================================
// Resource Source
// ============================================================================

/// Read access to bundled executables.
pub trait ResourceSource: Send + Sync {
    /// Opens a resource for streaming. `Ok(None)` means it doesn't exist.
    fn open(&self, name: &str) -> io::Result<Option<Box<dyn Read + Send + '_>>>;

    /// Length of a resource in bytes, if it exists and is cheap to learn.
    fn byte_len(&self, name: &str) -> Option<u64>;

    /// Returns true if the resource exists.
    fn contains(&self, name: &str) -> bool {
        self.byte_len(name).is_some()
    }

    /// Short description for log lines.
    fn describe(&self) -> String;
}

// ============================================================================
// Embedded Resources
// ============================================================================

/// Resources compiled into the binary as `(name, bytes)` pairs.
#[derive(Clone, Copy)]
pub struct EmbeddedResources {
    entries: &'static [(&'static str, &'static [u8])],
}

impl EmbeddedResources {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }

    /// The executables embedded at build time from the `native/` directory.
    pub fn bundled() -> Self {
        Self::new(generated::BUNDLED_NATIVE)
    }

    /// Names of all embedded resources.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(name, _)| *name)
    }

    fn get(&self, name: &str) -> Option<&'static [u8]> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, bytes)| *bytes)
    }
}

impl fmt::Debug for EmbeddedResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedResources")
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ResourceSource for EmbeddedResources {
    fn open(&self, name: &str) -> io::Result<Option<Box<dyn Read + Send + '_>>> {
        Ok(self
            .get(name)
            .map(|bytes| Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>))
    }

    fn byte_len(&self, name: &str) -> Option<u64> {
        self.get(name).map(|bytes| bytes.len() as u64)
    }

    fn describe(&self) -> String {
        format!("embedded ({} entries)", self.entries.len())
    }
}

// ============================================================================
// Directory Resources
// ============================================================================

/// Resources read from a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a resource name onto a file under the root.
    ///
    /// Names that are absolute or climb out with `..` are refused.
    fn resolve(&self, name: &str) -> Option<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes {
            warn!("Refusing resource name outside resource root: {:?}", name);
            return None;
        }

        Some(self.root.join(relative))
    }
}

impl ResourceSource for DirectoryResources {
    fn open(&self, name: &str) -> io::Result<Option<Box<dyn Read + Send + '_>>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };

        if !path.is_file() {
            return Ok(None);
        }

        let file = File::open(&path)?;
        Ok(Some(Box::new(file)))
    }

    fn byte_len(&self, name: &str) -> Option<u64> {
        let path = self.resolve(name)?;
        fs::metadata(path)
            .ok()
            .filter(|meta| meta.is_file())
            .map(|meta| meta.len())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

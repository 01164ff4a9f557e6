//! Host Collaborators
//!
//! Traits for the pieces the surrounding caching framework provides: the
//! default cache directory, writable directory creation, and cache
//! definitions. [`LocalHost`] is a plain filesystem implementation.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

// == Cache Host ==
/// Services the store borrows from its host framework.
pub trait CacheHost {
    /// Resolves (and creates) the default cache directory for `relative`.
    ///
    /// Returns None if the directory cannot be created.
    fn cache_directory(&self, relative: &str) -> Option<PathBuf>;

    /// Creates `path` and any missing parents.
    fn make_writable_directory(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

// == Local Host ==
/// Filesystem host rooted at a base directory.
#[derive(Debug, Clone)]
pub struct LocalHost {
    base: PathBuf,
}

impl LocalHost {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Uses `ONEFILE_CACHE_DIR`, or `<tmp>/onefile_cache` when unset.
    pub fn from_env() -> Self {
        let base = env::var("ONEFILE_CACHE_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("onefile_cache"));
        Self::new(base)
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

impl CacheHost for LocalHost {
    fn cache_directory(&self, relative: &str) -> Option<PathBuf> {
        let dir = self.base.join(relative);
        match self.make_writable_directory(&dir) {
            Ok(()) => Some(dir),
            Err(e) => {
                warn!("Unable to create cache directory {}: {}", dir.display(), e);
                None
            }
        }
    }
}

// == Cache Definition ==
/// A logical namespace within the cache, identified by a stable string id.
pub trait CacheDefinition {
    fn id(&self) -> &str;
}

impl CacheDefinition for str {
    fn id(&self) -> &str {
        self
    }
}

impl CacheDefinition for String {
    fn id(&self) -> &str {
        self.as_str()
    }
}

impl<T: CacheDefinition + ?Sized> CacheDefinition for &T {
    fn id(&self) -> &str {
        (**self).id()
    }
}

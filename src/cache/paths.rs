//! Path Resolution Module
//!
//! Works out the root directory of a store and the per-definition file
//! layout beneath it.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::host::CacheHost;

/// Directory under the host cache directory that holds default store roots.
pub const STORE_DIRECTORY: &str = "cachestore_onefile";

/// Consolidated data file name within a definition directory.
pub const DATA_FILE: &str = "big.cache";

/// Metadata file name within a definition directory.
pub const METADATA_FILE: &str = "big.config";

// == Resolved Root ==
/// Outcome of resolving a store's root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    /// Root directory, None when the store cannot be used
    pub path: Option<PathBuf>,
    /// True when the path came from configuration rather than the host
    pub custom: bool,
}

impl ResolvedRoot {
    pub fn is_ready(&self) -> bool {
        self.path.is_some()
    }
}

// == Resolve ==
/// Determines, and creates if allowed, the root directory for store `name`.
///
/// Never fails: an unusable path yields a root without a path and a warning.
pub fn resolve_root(name: &str, config: &StoreConfig, host: &dyn CacheHost) -> ResolvedRoot {
    let Some(custom) = config.custom_path() else {
        let relative = format!("{}/{}", STORE_DIRECTORY, clean_store_name(name));
        let path = host.cache_directory(&relative);
        if path.is_none() {
            warn!("Unable to create default cache directory for store `{}`", name);
        }
        return ResolvedRoot {
            path,
            custom: false,
        };
    };

    let mut path = Some(custom.to_path_buf());

    if !custom.is_dir() {
        if config.autocreate {
            if let Err(e) = host.make_writable_directory(custom) {
                warn!(
                    "Error trying to autocreate file store path {}: {}",
                    custom.display(),
                    e
                );
                path = None;
            } else {
                debug!("Created file store path {}", custom.display());
            }
        } else {
            warn!(
                "The given file cache store path does not exist: {}",
                custom.display()
            );
            path = None;
        }
    }

    if path.is_some() && !is_writable(custom) {
        warn!("The file cache store path is not writable for `{}`", name);
        path = None;
    }

    ResolvedRoot { path, custom: true }
}

static CHECK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns true if a file can be created inside `dir`.
pub fn is_writable(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let check = dir.join(format!(
        ".onefile-write-check-{}-{}-{}",
        process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        CHECK_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    match OpenOptions::new().write(true).create_new(true).open(&check) {
        Ok(_) => {
            let _ = fs::remove_file(&check);
            true
        }
        Err(_) => false,
    }
}

/// Sibling path used while a file is being rewritten.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

// == Name Sanitizing ==
/// Strips every character outside `[A-Za-z0-9._-]` from a store name.
pub fn clean_store_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect()
}

/// Replaces each run of non-alphanumeric characters with a single `_`.
pub fn sanitize_definition_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut in_run = false;
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out
}

// == Definition Paths ==
/// File locations for one bound definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionPaths {
    pub dir: PathBuf,
    pub data_file: PathBuf,
    pub metadata_file: PathBuf,
}

impl DefinitionPaths {
    pub fn new(root: &Path, definition_id: &str) -> Self {
        let dir = root.join(sanitize_definition_id(definition_id));
        Self {
            data_file: dir.join(DATA_FILE),
            metadata_file: dir.join(METADATA_FILE),
            dir,
        }
    }
}

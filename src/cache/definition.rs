//! Definition Store Module
//!
//! The consolidated-file engine. One [`DefinitionStore`] owns the whole
//! key/value map of one cache definition, loaded from a single data file at
//! bind time and written back once when the store is flushed or dropped.
//!
//! Two live stores bound to the same definition do not coordinate: whichever
//! flushes last overwrites the other's changes.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::paths::{tmp_path, DefinitionPaths};
use crate::cache::{keys, CacheStats, DirtyState, StalenessPolicy};
use crate::cache::staleness::current_timestamp;
use crate::error::{Result, StoreError};
use crate::host::CacheHost;

// == Metadata ==
/// Contents of the metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unix timestamp (seconds) of the last purge
    pub last_purge: i64,
}

// == Definition Store ==
/// In-memory map of one definition plus its write-back state.
///
/// Dropping a dirty store flushes it; failures on that path are logged and
/// otherwise ignored. Call [`flush`](Self::flush) to observe them.
pub struct DefinitionStore<V: Serialize> {
    definition_id: String,
    paths: DefinitionPaths,
    entries: HashMap<String, V>,
    last_purge: i64,
    dirty: DirtyState,
    stats: CacheStats,
}

impl<V> DefinitionStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    // == Open ==
    /// Binds to `definition_id` under `root`, loading or creating its files.
    ///
    /// A stale definition is purged before this returns.
    pub fn open(
        root: &Path,
        definition_id: &str,
        policy: StalenessPolicy,
        host: &dyn CacheHost,
    ) -> Result<Self> {
        let paths = DefinitionPaths::new(root, definition_id);
        host.make_writable_directory(&paths.dir)
            .map_err(|e| StoreError::io(&paths.dir, e))?;

        // A freshly created data file starts the staleness clock.
        let (entries, created_at) = match read_optional(&paths.data_file)? {
            Some(bytes) => (decode::<HashMap<String, V>>(&paths.data_file, &bytes)?, None),
            None => match create_empty_data_file(&paths.data_file)? {
                None => {
                    debug!("Created {}", paths.data_file.display());
                    (HashMap::new(), Some(current_timestamp()))
                }
                Some(bytes) => (decode(&paths.data_file, &bytes)?, None),
            },
        };

        let last_purge = match read_optional(&paths.metadata_file)? {
            Some(bytes) => decode::<Metadata>(&paths.metadata_file, &bytes)?.last_purge,
            None => {
                // Pre-existing data without metadata restarts the clock at now.
                let metadata = Metadata {
                    last_purge: created_at.unwrap_or_else(current_timestamp),
                };
                let bytes = encode(&paths.metadata_file, &metadata)?;
                fs::write(&paths.metadata_file, bytes)
                    .map_err(|e| StoreError::io(&paths.metadata_file, e))?;
                metadata.last_purge
            }
        };

        let mut store = Self {
            definition_id: definition_id.to_string(),
            paths,
            entries,
            last_purge,
            dirty: DirtyState::Clean,
            stats: CacheStats::new(),
        };

        if policy.is_stale_now(store.last_purge) {
            info!(
                "Definition `{}` is stale (last purge {}), purging",
                store.definition_id,
                format_timestamp(store.last_purge)
            );
            store.purge();
        }

        info!(
            "Bound definition `{}` with {} entries (last purge {})",
            store.definition_id,
            store.entries.len(),
            format_timestamp(store.last_purge)
        );

        Ok(store)
    }

    // == Get ==
    /// Returns a copy of the value for `key`, or None if absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Set ==
    /// Stores `value` under `key`, overwriting any previous value.
    pub fn set(&mut self, key: String, value: V) {
        self.entries.insert(key, value);
        self.stats.record_write();
        self.dirty.mark_dirty();
    }

    // == Delete ==
    /// Removes `key`; absent keys are not an error.
    pub fn delete(&mut self, key: &str) {
        self.entries.remove(key);
        self.stats.record_delete();
        self.dirty.mark_dirty();
    }

    // == Purge ==
    /// Clears every entry and restarts the staleness clock.
    pub fn purge(&mut self) {
        self.entries.clear();
        self.last_purge = current_timestamp();
        self.stats.record_purge();
        self.dirty.mark_dirty();
    }

    pub fn find_all(&self) -> HashSet<String> {
        keys::find_all(&self.entries)
    }

    pub fn find_by_prefix(&self, prefix: &str) -> HashSet<String> {
        keys::find_by_prefix(&self.entries, prefix)
    }

    /// Makes one final flush attempt and releases the binding.
    ///
    /// The attempt is final either way: dropping afterwards does no I/O.
    pub fn close(mut self) -> Result<bool> {
        let outcome = self.flush();
        self.dirty.mark_clean();
        outcome
    }

    /// Throws away unflushed changes and releases the binding without I/O.
    pub fn discard(mut self) {
        debug!("Discarding definition `{}`", self.definition_id);
        self.dirty.mark_clean();
    }
}

impl<V: Serialize> DefinitionStore<V> {
    // == Flush ==
    /// Writes metadata and data files if anything changed since load.
    ///
    /// Returns Ok(true) if files were written, Ok(false) if clean.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty.needs_flush() {
            debug!("No cache writes for `{}`", self.definition_id);
            return Ok(false);
        }

        let metadata = Metadata {
            last_purge: self.last_purge,
        };
        write_atomic(
            &self.paths.metadata_file,
            &encode(&self.paths.metadata_file, &metadata)?,
        )?;
        write_atomic(
            &self.paths.data_file,
            &encode(&self.paths.data_file, &self.entries)?,
        )?;

        self.dirty.mark_clean();
        debug!(
            "Flushed {} entries for `{}` to {}",
            self.entries.len(),
            self.definition_id,
            self.paths.data_file.display()
        );
        Ok(true)
    }

    pub fn definition_id(&self) -> &str {
        &self.definition_id
    }

    pub fn paths(&self) -> &DefinitionPaths {
        &self.paths
    }

    pub fn last_purge(&self) -> i64 {
        self.last_purge
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_dirty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }
}

impl<V: Serialize> Drop for DefinitionStore<V> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(
                "Dropping unflushed changes for `{}`: {}",
                self.definition_id, e
            );
        }
    }
}

// == File Helpers ==
/// Reads a whole file, returning None if it does not exist.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Creates the data file holding an empty map, failing if it already exists.
///
/// Returns the contents of the existing file when another creator won. A
/// winner that has not written yet leaves an empty file, read as `{}`.
fn create_empty_data_file(path: &Path) -> Result<Option<Vec<u8>>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(b"{}")
                .map_err(|e| StoreError::io(path, e))?;
            Ok(None)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let bytes = fs::read(path).map_err(|e| StoreError::io(path, e))?;
            if bytes.is_empty() {
                Ok(Some(b"{}".to_vec()))
            } else {
                Ok(Some(bytes))
            }
        }
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Writes through a sibling temporary file so readers never see a partial file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(&tmp, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        StoreError::io(path, e)
    })
}

fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::CorruptPayload {
        path: path.to_path_buf(),
        source,
    })
}

fn encode<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

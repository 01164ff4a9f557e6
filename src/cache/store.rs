//! Cache Store Module
//!
//! The public store: resolves its root directory once, binds to a single
//! definition, and dispatches every operation to the bound
//! [`DefinitionStore`]. A store that is not ready or not bound answers every
//! operation with its empty/false result.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::paths::{self, tmp_path, ResolvedRoot, DATA_FILE, METADATA_FILE};
use crate::cache::{CacheStats, DefinitionStore, StalenessPolicy};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::host::{CacheDefinition, CacheHost, LocalHost};

enum Binding<V: Serialize> {
    Unbound,
    Bound(DefinitionStore<V>),
    Deleted,
}

// == One File Store ==
/// A named cache store instance bound to at most one definition.
///
/// Mutations stay in memory until [`close`](Self::close) or drop.
pub struct OneFileStore<V: Serialize = serde_json::Value> {
    name: String,
    config: StoreConfig,
    root: ResolvedRoot,
    host: Box<dyn CacheHost>,
    binding: Binding<V>,
}

impl<V> OneFileStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    // == Constructor ==
    /// Creates a store named `name`, resolving its root directory.
    ///
    /// Never fails; check [`is_ready`](Self::is_ready).
    pub fn new(
        name: impl Into<String>,
        config: StoreConfig,
        host: impl CacheHost + 'static,
    ) -> Self {
        let name = name.into();
        let root = paths::resolve_root(&name, &config, &host);
        if let Some(path) = &root.path {
            debug!("Store `{}` rooted at {}", name, path.display());
        }
        Self {
            name,
            config,
            root,
            host: Box::new(host),
            binding: Binding::Unbound,
        }
    }

    /// Creates a store using the [`LocalHost`] from the environment.
    pub fn with_local_host(name: impl Into<String>, config: StoreConfig) -> Self {
        Self::new(name, config, LocalHost::from_env())
    }

    // == Initialise ==
    /// Binds the store to `definition`, loading its data from disk.
    ///
    /// A store that is not ready stays unbound and returns Ok. A corrupt
    /// data or metadata file yields [`StoreError::CorruptPayload`].
    pub fn initialise<D>(&mut self, definition: &D) -> Result<()>
    where
        D: CacheDefinition + ?Sized,
    {
        let Some(root) = self.root.path.as_deref() else {
            warn!(
                "Store `{}` is not ready, ignoring definition `{}`",
                self.name,
                definition.id()
            );
            return Ok(());
        };

        match &self.binding {
            Binding::Unbound => {}
            Binding::Bound(bound) => {
                return Err(StoreError::AlreadyBound(bound.definition_id().to_string()))
            }
            Binding::Deleted => return Err(StoreError::InstanceDeleted(self.name.clone())),
        }

        let policy = StalenessPolicy::new(self.config.ttl);
        let bound = DefinitionStore::open(root, definition.id(), policy, self.host.as_ref())?;
        self.binding = Binding::Bound(bound);
        Ok(())
    }

    fn bound(&self) -> Option<&DefinitionStore<V>> {
        match &self.binding {
            Binding::Bound(bound) => Some(bound),
            _ => None,
        }
    }

    fn bound_mut(&mut self) -> Option<&mut DefinitionStore<V>> {
        match &mut self.binding {
            Binding::Bound(bound) => Some(bound),
            _ => None,
        }
    }

    // == Get ==
    /// Returns a copy of the value for `key`, or None if absent.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.bound_mut()?.get(key)
    }

    /// Looks up each key independently; missing keys map to None.
    pub fn get_many<I, K>(&mut self, keys: I) -> HashMap<String, Option<V>>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .map(|key| {
                let key = key.as_ref();
                (key.to_string(), self.get(key))
            })
            .collect()
    }

    // == Set ==
    /// Stores `value` under `key`. Returns false if the store is unusable.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> bool {
        match self.bound_mut() {
            Some(bound) => {
                bound.set(key.into(), value);
                true
            }
            None => false,
        }
    }

    /// Sets each pair independently and returns how many succeeded.
    pub fn set_many<I, K>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        let mut count = 0;
        for (key, value) in pairs {
            if self.set(key, value) {
                count += 1;
            }
        }
        count
    }

    // == Delete ==
    /// Removes `key`. Succeeds even if the key was absent.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.bound_mut() {
            Some(bound) => {
                bound.delete(key);
                true
            }
            None => false,
        }
    }

    /// Deletes each key and returns how many deletions succeeded.
    pub fn delete_many<I, K>(&mut self, keys: I) -> usize
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter()
            .filter(|key| self.delete(key.as_ref()))
            .count()
    }

    // == Has ==
    pub fn has(&self, key: &str) -> bool {
        self.bound().is_some_and(|bound| bound.contains(key))
    }

    /// True if every key is present. Stops at the first miss.
    pub fn has_all<I, K>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        if self.bound().is_none() {
            return false;
        }
        keys.into_iter().all(|key| self.has(key.as_ref()))
    }

    /// True if at least one key is present. Stops at the first hit.
    pub fn has_any<I, K>(&self, keys: I) -> bool
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        keys.into_iter().any(|key| self.has(key.as_ref()))
    }

    // == Purge ==
    /// Clears the bound definition and restarts its staleness clock.
    pub fn purge(&mut self) -> bool {
        match self.bound_mut() {
            Some(bound) => {
                bound.purge();
                info!("Purged definition `{}`", bound.definition_id());
                true
            }
            None => false,
        }
    }

    // == Key Search ==
    pub fn find_all(&self) -> HashSet<String> {
        self.bound().map(|b| b.find_all()).unwrap_or_default()
    }

    /// Keys beginning with the literal `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> HashSet<String> {
        self.bound()
            .map(|b| b.find_by_prefix(prefix))
            .unwrap_or_default()
    }

    // == Lifecycle ==
    /// Called by the host once the instance has been created.
    pub fn instance_created(&self) {
        debug!("Store instance `{}` created", self.name);
    }

    /// Removes every definition under the root, then the root itself if empty.
    ///
    /// Unflushed changes of the bound definition are discarded and the store
    /// cannot be bound again.
    pub fn instance_deleted(&mut self) -> bool {
        let Some(root) = self.root.path.clone() else {
            return false;
        };

        if let Binding::Bound(bound) = std::mem::replace(&mut self.binding, Binding::Deleted) {
            bound.discard();
        }

        let purged = purge_all_definitions(&root);
        if let Err(e) = fs::remove_dir(&root) {
            debug!("Left store root {} in place: {}", root.display(), e);
        }
        info!("Store instance `{}` deleted", self.name);
        purged
    }

    /// Flushes pending changes and releases the store.
    ///
    /// Returns Ok(true) if files were written, Ok(false) if nothing changed.
    /// A failed flush is not retried on drop.
    pub fn close(mut self) -> Result<bool> {
        match std::mem::replace(&mut self.binding, Binding::Unbound) {
            Binding::Bound(bound) => bound.close(),
            _ => Ok(false),
        }
    }

    // == Accessors ==
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root.path.as_deref()
    }

    /// True if the root directory was usable at construction time.
    pub fn is_ready(&self) -> bool {
        self.root.is_ready()
    }

    /// True once a definition has been loaded.
    pub fn is_initialised(&self) -> bool {
        self.bound().is_some()
    }

    pub fn definition_id(&self) -> Option<&str> {
        self.bound().map(|b| b.definition_id())
    }

    pub fn has_custom_path(&self) -> bool {
        self.root.custom
    }

    pub fn autocreate(&self) -> bool {
        self.config.autocreate
    }

    pub fn single_directory(&self) -> bool {
        self.config.singledirectory
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.bound().map(|b| b.stats()).unwrap_or_default()
    }
}

impl<V: Serialize> fmt::Debug for OneFileStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definition = match &self.binding {
            Binding::Bound(bound) => Some(bound.definition_id()),
            _ => None,
        };
        f.debug_struct("OneFileStore")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("definition", &definition)
            .finish()
    }
}

/// Deletes the files this store creates in every definition directory.
fn purge_all_definitions(root: &Path) -> bool {
    let dirs = match fs::read_dir(root) {
        Ok(dirs) => dirs,
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(e) => {
            warn!("Unable to list store root {}: {}", root.display(), e);
            return false;
        }
    };

    for dir in dirs.flatten().map(|entry| entry.path()).filter(|p| p.is_dir()) {
        let owned = [DATA_FILE, METADATA_FILE].map(|file| dir.join(file));
        let leftovers = owned.iter().map(|file| tmp_path(file));
        for file in owned.iter().cloned().chain(leftovers) {
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Unable to remove {}: {}", file.display(), e),
            }
        }
        if fs::remove_dir(&dir).is_ok() {
            debug!("Removed definition directory {}", dir.display());
        }
    }
    true
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Shared buffer collecting formatted log output.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, logs.contents())
    }

    /// Replaces the data file with a non-empty directory so writes fail.
    fn block_data_file(tmp: &TempDir) {
        let data_file = tmp.path().join("core_config").join(DATA_FILE);
        fs::remove_file(&data_file).unwrap();
        fs::create_dir(&data_file).unwrap();
        fs::write(data_file.join("blocker"), b"x").unwrap();
    }

    fn ready_store(tmp: &TempDir) -> OneFileStore {
        let config = StoreConfig::default().with_path(tmp.path());
        OneFileStore::new("test", config, LocalHost::new(tmp.path()))
    }

    fn bound_store(tmp: &TempDir) -> OneFileStore {
        let mut store = ready_store(tmp);
        store.initialise("core/config").unwrap();
        store
    }

    fn not_ready_store(tmp: &TempDir) -> OneFileStore {
        let config = StoreConfig::default().with_path(tmp.path().join("missing"));
        OneFileStore::new("test", config, LocalHost::new(tmp.path()))
    }

    #[test]
    fn test_store_new() {
        let tmp = TempDir::new().unwrap();
        let store = ready_store(&tmp);
        assert!(store.is_ready());
        assert!(!store.is_initialised());
        assert!(store.has_custom_path());
        assert_eq!(store.name(), "test");
        assert_eq!(store.root_path(), Some(tmp.path()));
    }

    #[test]
    fn test_store_set_and_get() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);

        assert!(store.set("key1", json!("value1")));
        assert_eq!(store.get("key1"), Some(json!("value1")));
        assert!(store.has("key1"));
    }

    #[test]
    fn test_store_get_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);

        assert_eq!(store.get("nonexistent"), None);
        assert!(!store.has("nonexistent"));
    }

    #[test]
    fn test_store_overwrite() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);

        store.set("key1", json!(1));
        store.set("key1", json!(2));
        assert_eq!(store.get("key1"), Some(json!(2)));
        assert_eq!(store.find_all().len(), 1);
    }

    #[test]
    fn test_store_delete_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);
        store.set("kept", json!(true));

        assert!(store.delete("nonexistent"));
        assert_eq!(store.find_all(), HashSet::from(["kept".to_string()]));
    }

    #[test]
    fn test_store_batches() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);

        let stored = store.set_many([("a", json!(1)), ("b", json!(2)), ("c", json!(3))]);
        assert_eq!(stored, 3);

        let values = store.get_many(["a", "x"]);
        assert_eq!(values.len(), 2);
        assert_eq!(values["a"], Some(json!(1)));
        assert_eq!(values["x"], None);

        assert!(store.has_all(["a", "b"]));
        assert!(!store.has_all(["a", "x"]));
        assert!(store.has_any(["x", "c"]));
        assert!(!store.has_any(["x", "y"]));

        assert_eq!(store.delete_many(["a", "b", "zzz"]), 3);
        assert_eq!(store.find_all(), HashSet::from(["c".to_string()]));
    }

    #[test]
    fn test_has_all_of_nothing() {
        let tmp = TempDir::new().unwrap();
        let store = bound_store(&tmp);
        assert!(store.has_all(Vec::<String>::new()));
        assert!(!store.has_any(Vec::<String>::new()));
    }

    #[test]
    fn test_store_purge() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);
        store.set_many([("a", json!(1)), ("b", json!(2))]);

        assert!(store.purge());
        assert!(store.find_all().is_empty());
        assert!(!store.has_any(["a", "b"]));
    }

    #[test]
    fn test_find_by_prefix() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);
        store.set_many([("a_1", json!(1)), ("a_2", json!(2)), ("b_1", json!(3))]);

        assert_eq!(
            store.find_by_prefix("a_"),
            HashSet::from(["a_1".to_string(), "a_2".to_string()])
        );
        assert_eq!(store.find_by_prefix(""), store.find_all());
    }

    #[test]
    fn test_initialise_twice() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);

        let result = store.initialise("other");
        assert!(matches!(result, Err(StoreError::AlreadyBound(id)) if id == "core/config"));
        assert_eq!(store.definition_id(), Some("core/config"));
    }

    #[test]
    fn test_unbound_store_degrades() {
        let tmp = TempDir::new().unwrap();
        let mut store = ready_store(&tmp);

        assert!(!store.set("a", json!(1)));
        assert_eq!(store.get("a"), None);
        assert!(!store.purge());
        assert!(store.find_all().is_empty());
    }

    #[test]
    fn test_not_ready_store_degrades() {
        let tmp = TempDir::new().unwrap();
        let mut store = not_ready_store(&tmp);

        assert!(!store.is_ready());
        assert!(store.root_path().is_none());
        assert!(store.initialise("core/config").is_ok());
        assert!(!store.is_initialised());

        assert!(!store.set("a", json!(1)));
        assert_eq!(store.set_many([("a", json!(1))]), 0);
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get_many(["a"])["a"], None);
        assert!(!store.delete("a"));
        assert_eq!(store.delete_many(["a"]), 0);
        assert!(!store.has("a"));
        assert!(!store.has_all(["a"]));
        assert!(!store.has_any(["a"]));
        assert!(!store.purge());
        assert!(store.find_all().is_empty());
        assert!(store.find_by_prefix("").is_empty());
        assert!(!store.instance_deleted());
        assert_eq!(store.stats(), CacheStats::default());
        assert!(!store.close().unwrap());
    }

    #[test]
    fn test_close_reports_writes() {
        let tmp = TempDir::new().unwrap();
        let store = bound_store(&tmp);
        assert!(!store.close().unwrap());

        let mut store = bound_store(&tmp);
        store.set("a", json!(1));
        assert!(store.close().unwrap());

        let mut reopened = bound_store(&tmp);
        assert_eq!(reopened.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_failed_close_is_not_retried_on_drop() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);
        store.set("a", json!(1));
        block_data_file(&tmp);

        let (closed, logs) = with_captured_logs(|| store.close());

        assert!(closed.is_err());
        assert!(!logs.contains("Dropping unflushed changes"), "{}", logs);
        assert_eq!(logs.matches("No cache writes").count(), 1, "{}", logs);
        assert!(!tmp.path().join("core_config").join("big.cache.tmp").exists());
    }

    #[test]
    fn test_failed_drop_warns_once() {
        let tmp = TempDir::new().unwrap();
        let mut store = bound_store(&tmp);
        store.set("a", json!(1));
        block_data_file(&tmp);

        let ((), logs) = with_captured_logs(|| drop(store));

        assert_eq!(logs.matches("Dropping unflushed changes").count(), 1, "{}", logs);
    }

    #[test]
    fn test_instance_deleted_removes_leftover_tmp_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let config = StoreConfig::default().with_path(&root).with_autocreate(true);

        let mut store: OneFileStore =
            OneFileStore::new("test", config, LocalHost::new(tmp.path()));
        store.initialise("core/config").unwrap();
        let dir = root.join("core_config");
        fs::write(dir.join("big.cache.tmp"), b"{").unwrap();
        fs::write(dir.join("big.config.tmp"), b"{").unwrap();

        assert!(store.instance_deleted());
        assert!(!root.exists());
    }

    #[test]
    fn test_instance_deleted_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("root");
        let config = StoreConfig::default().with_path(&root).with_autocreate(true);

        {
            let mut other: OneFileStore =
                OneFileStore::new("test", config.clone(), LocalHost::new(tmp.path()));
            other.initialise("other/def").unwrap();
            other.set("x", json!(1));
        }

        let mut store: OneFileStore =
            OneFileStore::new("test", config, LocalHost::new(tmp.path()));
        store.initialise("core/config").unwrap();
        store.set("unflushed", json!(1));

        assert!(store.instance_deleted());
        assert!(!root.exists());
        assert!(!store.is_initialised());
        assert!(matches!(
            store.initialise("core/config"),
            Err(StoreError::InstanceDeleted(_))
        ));

        // Dropping after deletion must not recreate files.
        drop(store);
        assert!(!root.exists());
    }

    #[test]
    fn test_typed_values() {
        #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
        struct Course {
            id: u32,
            title: String,
        }

        let tmp = TempDir::new().unwrap();
        let config = StoreConfig::default().with_path(tmp.path());
        let course = Course {
            id: 7,
            title: "Rust".to_string(),
        };

        let mut store: OneFileStore<Course> =
            OneFileStore::new("typed", config.clone(), LocalHost::new(tmp.path()));
        store.initialise("courses").unwrap();
        store.set("c7", course.clone());
        store.close().unwrap();

        let mut store: OneFileStore<Course> =
            OneFileStore::new("typed", config, LocalHost::new(tmp.path()));
        store.initialise("courses").unwrap();
        assert_eq!(store.get("c7"), Some(course));
    }

    #[test]
    fn test_debug_output() {
        let tmp = TempDir::new().unwrap();
        let store = bound_store(&tmp);
        let debug = format!("{:?}", store);
        assert!(debug.contains("core/config"));
    }
}

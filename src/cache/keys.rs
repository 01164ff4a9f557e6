//! Key Index Module
//!
//! Key enumeration and prefix search over the in-memory map. Never touches
//! the disk.

use std::collections::{HashMap, HashSet};

/// Returns a snapshot of every key in `entries`.
pub fn find_all<V>(entries: &HashMap<String, V>) -> HashSet<String> {
    entries.keys().cloned().collect()
}

/// Returns the keys in `entries` starting with `prefix`.
///
/// The prefix is a literal string; `*`, `?` and `[` match only themselves.
pub fn find_by_prefix<V>(entries: &HashMap<String, V>, prefix: &str) -> HashSet<String> {
    entries
        .keys()
        .filter(|key| key.starts_with(prefix))
        .cloned()
        .collect()
}

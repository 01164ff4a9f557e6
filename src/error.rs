//! Error types for the cache store
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use thiserror::Error;

// == Store Error Enum ==
/// Unified error type for the cache store.
///
/// Only binding and flushing surface errors. Lookups and mutations on the
/// in-memory map degrade to empty/false results instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem operation failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A data or metadata file could not be decoded
    #[error("Corrupt cache payload in {path}: {source}")]
    CorruptPayload {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory map could not be encoded for writing
    #[error("Failed to serialize cache payload for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store is already bound to a definition
    #[error("Store already bound to definition: {0}")]
    AlreadyBound(String),

    /// The store instance was deleted and cannot be bound again
    #[error("Store instance deleted: {0}")]
    InstanceDeleted(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error reports a corrupt on-disk payload.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, StoreError::CorruptPayload { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache store.
pub type Result<T> = std::result::Result<T, StoreError>;

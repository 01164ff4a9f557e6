//! Cache Module
//!
//! Disk-backed key/value storage with one consolidated file per cache
//! definition, time-to-live staleness and write-back on teardown.

mod definition;
mod dirty;
mod keys;
pub mod paths;
mod staleness;
mod stats;
mod store;


// Re-export public types
pub use definition::{DefinitionStore, Metadata};
pub use dirty::DirtyState;
pub use paths::{DefinitionPaths, ResolvedRoot, DATA_FILE, METADATA_FILE};
pub use staleness::{current_timestamp, StalenessPolicy};
pub use stats::CacheStats;
pub use store::OneFileStore;

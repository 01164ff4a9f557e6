//! OneFile Cache - A disk-backed key/value cache store
//!
//! Keeps each cache definition in one consolidated file, loads it whole when
//! the store is bound and writes it back once when the store is torn down.

pub mod cache;
pub mod config;
pub mod error;
pub mod features;
pub mod host;

pub use cache::{CacheStats, OneFileStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use host::{CacheDefinition, CacheHost, LocalHost};

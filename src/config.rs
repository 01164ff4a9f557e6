//! Configuration Module
//!
//! Handles loading and managing store configuration from environment variables
//! or from a host-supplied configuration map.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default time-to-live in seconds between purges (100 days).
pub const DEFAULT_TTL_SECS: u64 = 8_640_000;

/// Store configuration parameters.
///
/// Every field is optional in a configuration map; missing fields take the
/// same defaults as [`StoreConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Custom root directory; empty or absent means "use the host cache directory"
    pub path: Option<PathBuf>,
    /// Create the custom path if it does not exist
    pub autocreate: bool,
    /// Keep files in a single directory (accepted, no effect on the consolidated layout)
    pub singledirectory: bool,
    /// Scan the directory on load (accepted, no effect on the consolidated layout)
    pub prescan: bool,
    /// Seconds after the last purge at which a definition is considered stale
    pub ttl: u64,
}

impl StoreConfig {
    /// Creates a new StoreConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `ONEFILE_PATH` - Custom root directory (default: host cache directory)
    /// - `ONEFILE_AUTOCREATE` - Create the custom path if missing (default: false)
    /// - `ONEFILE_SINGLEDIRECTORY` - Single-directory flag (default: false)
    /// - `ONEFILE_PRESCAN` - Prescan flag (default: false)
    /// - `ONEFILE_TTL` - Time-to-live in seconds (default: 8640000)
    pub fn from_env() -> Self {
        Self {
            path: env::var("ONEFILE_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            autocreate: env_flag("ONEFILE_AUTOCREATE"),
            singledirectory: env_flag("ONEFILE_SINGLEDIRECTORY"),
            prescan: env_flag("ONEFILE_PRESCAN"),
            ttl: env::var("ONEFILE_TTL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TTL_SECS),
        }
    }

    /// Builds a config from the host's configuration map.
    pub fn from_map(map: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(map)
    }

    /// Returns the custom path, treating an empty path as unset.
    pub fn custom_path(&self) -> Option<&Path> {
        self.path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_autocreate(mut self, autocreate: bool) -> Self {
        self.autocreate = autocreate;
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            autocreate: false,
            singledirectory: false,
            prescan: false,
            ttl: DEFAULT_TTL_SECS,
        }
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

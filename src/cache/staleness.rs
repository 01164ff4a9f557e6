//! Staleness Policy Module
//!
//! Decides whether a definition has outlived its time-to-live since the last
//! purge.

use chrono::Utc;

use crate::config::DEFAULT_TTL_SECS;

// == Staleness Policy ==
/// Time-to-live check evaluated once when a definition is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    /// Seconds a definition may go without a purge
    pub ttl: u64,
}

impl StalenessPolicy {
    pub fn new(ttl: u64) -> Self {
        Self { ttl }
    }

    // == Is Stale ==
    /// Returns true iff `now > last_purge + ttl`.
    ///
    /// A definition exactly `ttl` seconds old is still fresh.
    pub fn is_stale(&self, now: i64, last_purge: i64) -> bool {
        let ttl = i64::try_from(self.ttl).unwrap_or(i64::MAX);
        now > last_purge.saturating_add(ttl)
    }

    /// Same as [`is_stale`](Self::is_stale) against the current time.
    pub fn is_stale_now(&self, last_purge: i64) -> bool {
        self.is_stale(current_timestamp(), last_purge)
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECS)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

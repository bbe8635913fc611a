//! Cache sizing and expiry policy.

use std::time::Duration;

/// Sizing and expiry policy for a node's record cache.
///
/// Expiry here is a hard backstop, separate from consistency: an entry past
/// its TTL is gone regardless of whether it was ever contradicted, which
/// forces the next read back to the store. Fresh/stale bookkeeping lives on
/// the entries themselves and never extends a record's lifetime.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on cached records; least recently used entries are
    /// evicted beyond it.
    pub max_capacity: u64,

    /// Hard lifetime cap per record.
    pub ttl: Option<Duration>,

    /// Idle cap: records nobody reads are dropped after this long.
    pub tti: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl: Some(Duration::from_secs(3600)), // 1 hour
            tti: None,
        }
    }
}

impl CacheConfig {
    /// Cap the number of cached records.
    #[must_use]
    pub fn max_capacity(mut self, max_capacity: u64) -> Self {
        self.max_capacity = max_capacity;
        self
    }

    /// Evict records unconditionally once they reach this age.
    #[must_use]
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.ttl = Some(duration);
        self
    }

    /// Evict records that go unread for this long.
    #[must_use]
    pub fn tti(mut self, duration: Duration) -> Self {
        self.tti = Some(duration);
        self
    }

    /// Keep records until capacity eviction or explicit invalidation.
    #[must_use]
    pub fn no_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }
}

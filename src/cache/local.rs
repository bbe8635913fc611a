//! Local record cache wrapper around Moka.

use std::sync::Arc;

use moka::ops::compute::Op;
use moka::sync::Cache;
use tracing::debug;

use crate::record::{CacheEntry, Record};

use super::CacheConfig;

/// Per-process cache of records.
///
/// This cache is:
/// - Thread-safe and non-blocking (Moka sync cache behind an Arc)
/// - LRU-bounded with optional TTL/TTI
/// - Clone-friendly (cloning shares the same underlying cache)
pub struct LocalCache {
    inner: Arc<Cache<String, CacheEntry>>,
}

impl Clone for LocalCache {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl LocalCache {
    /// Create a new cache with the given config.
    pub fn new(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.ttl {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.tti {
            builder = builder.time_to_idle(tti);
        }

        Self {
            inner: Arc::new(builder.build()),
        }
    }

    /// Get the entry for a key.
    ///
    /// Returns `None` on miss or expiry; the caller decides what a `Stale`
    /// entry is good for.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.get(key)
    }

    /// Insert a record as a fresh, trusted entry.
    pub fn put_fresh(&self, record: Record) {
        let key = record.key.clone();
        self.inner.insert(key, CacheEntry::fresh(record));
    }

    /// Insert a record as fresh, unless a strictly newer version is already
    /// cached. Returns whether the record went in.
    ///
    /// The comparison and the insert run atomically under the entry, closing
    /// the window where a copy fetched from the store lands after a later
    /// update for the same key has already been applied. An equal version
    /// does insert: a refetch confirming a `Stale` entry re-freshens it.
    pub fn put_fresh_if_newer(&self, record: Record) -> bool {
        let key = record.key.clone();
        let mut inserted = false;
        let _ = self.inner.entry(key).and_compute_with(|existing| {
            let superseded = existing
                .map(|e| e.into_value().record.version > record.version)
                .unwrap_or(false);
            if superseded {
                Op::Nop
            } else {
                inserted = true;
                Op::Put(CacheEntry::fresh(record))
            }
        });
        inserted
    }

    /// Remove a key.
    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
    }

    /// Remove all entries.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Downgrade one entry to `Stale`, if present.
    pub fn mark_stale(&self, key: &str) {
        if let Some(entry) = self.inner.get(key) {
            if entry.is_fresh() {
                self.inner.insert(key.to_string(), entry.into_stale());
            }
        }
    }

    /// Downgrade every cached entry to `Stale`.
    ///
    /// This is the resync sweep run after a bus reconnect: events missed
    /// during the outage cannot be recovered, so nothing cached can be
    /// trusted until refetched or naturally evicted.
    pub fn mark_all_stale(&self) {
        let mut swept = 0usize;
        for (key, entry) in self.inner.iter() {
            if entry.is_fresh() {
                self.inner.insert(key.as_ref().clone(), entry.into_stale());
                swept += 1;
            }
        }
        debug!(swept, "cache sweep: all entries marked stale");
    }

    /// Approximate number of cached entries.
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }

    /// Force pending maintenance (eviction bookkeeping). Test helper.
    #[cfg(test)]
    pub fn sync(&self) {
        self.inner.run_pending_tasks();
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EntryState;
    use serde_json::json;
    use std::time::Duration;

    fn record(key: &str, version: u64) -> Record {
        Record::new(key, version, json!({"v": version}))
    }

    #[test]
    fn put_then_get_is_fresh() {
        let cache = LocalCache::new(CacheConfig::default());
        cache.put_fresh(record("player:1:balance", 1));

        let entry = cache.get("player:1:balance").unwrap();
        assert!(entry.is_fresh());
        assert_eq!(entry.record.version, 1);
    }

    #[test]
    fn expired_entry_behaves_as_miss() {
        let cache = LocalCache::new(CacheConfig::default().ttl(Duration::from_millis(20)));
        cache.put_fresh(record("player:1:balance", 1));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("player:1:balance").is_none());
    }

    #[test]
    fn capacity_bound_evicts() {
        let cache = LocalCache::new(CacheConfig::default().max_capacity(4).no_ttl());
        for i in 0..32 {
            cache.put_fresh(record(&format!("player:{i}:balance"), 1));
        }
        cache.sync();
        assert!(cache.entry_count() <= 4);
    }

    #[test]
    fn older_record_never_replaces_a_newer_entry() {
        let cache = LocalCache::new(CacheConfig::default());
        cache.put_fresh(record("a", 4));

        assert!(!cache.put_fresh_if_newer(record("a", 3)));

        let entry = cache.get("a").unwrap();
        assert_eq!(entry.record.version, 4);
        assert_eq!(entry.record.payload, json!({"v": 4}));
    }

    #[test]
    fn refetch_at_the_same_version_refreshens_a_stale_entry() {
        let cache = LocalCache::new(CacheConfig::default());
        cache.put_fresh(record("a", 2));
        cache.mark_stale("a");

        assert!(cache.put_fresh_if_newer(record("a", 2)));
        assert_eq!(cache.get("a").unwrap().state, EntryState::Fresh);
    }

    #[test]
    fn mark_all_stale_downgrades_everything() {
        let cache = LocalCache::new(CacheConfig::default());
        cache.put_fresh(record("a", 1));
        cache.put_fresh(record("b", 2));

        cache.mark_all_stale();

        assert_eq!(cache.get("a").unwrap().state, EntryState::Stale);
        assert_eq!(cache.get("b").unwrap().state, EntryState::Stale);
        // Records themselves survive the sweep
        assert_eq!(cache.get("b").unwrap().record.version, 2);
    }

    #[test]
    fn invalidate_removes_the_entry() {
        let cache = LocalCache::new(CacheConfig::default());
        cache.put_fresh(record("a", 1));
        cache.invalidate("a");
        assert!(cache.get("a").is_none());
    }
}

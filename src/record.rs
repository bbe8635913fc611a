//! Data model: versioned records and their cached form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned payload for one key, as held by the persistent store.
///
/// The version is monotonically non-decreasing per key; the store's atomic
/// increment is the sole authority for conflict resolution. Payloads are
/// whole-record replacements, never partial patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Key, conventionally `domain:id` (e.g. `player:42:balance`).
    pub key: String,

    /// Monotonic per-key version assigned by the store.
    pub version: u64,

    /// Opaque structured payload.
    pub payload: Value,

    /// When the store last accepted a write for this key.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    pub fn new(key: impl Into<String>, version: u64, payload: Value) -> Self {
        Self {
            key: key.into(),
            version,
            payload,
            updated_at: Utc::now(),
        }
    }
}

/// Trust level of a cache entry.
///
/// The third logical state, absent, is represented by the entry simply
/// not existing in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Entry is trusted; reads are served from it without touching the store.
    Fresh,

    /// An invalidation was received or bus connectivity was lost. The entry
    /// must be refetched before being served as authoritative, but may still
    /// back a read when the store is unreachable.
    Stale,
}

/// A local, time-bounded copy of a [`Record`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub record: Record,
    pub state: EntryState,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn fresh(record: Record) -> Self {
        Self {
            record,
            state: EntryState::Fresh,
            cached_at: Utc::now(),
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.state == EntryState::Fresh
    }

    /// Downgraded copy of this entry, keeping the record and cache time.
    pub fn into_stale(mut self) -> Self {
        self.state = EntryState::Stale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stale_downgrade_keeps_the_record() {
        let entry = CacheEntry::fresh(Record::new("player:42:balance", 3, json!({"gold": 100})));
        let stale = entry.clone().into_stale();
        assert_eq!(stale.state, EntryState::Stale);
        assert_eq!(stale.record, entry.record);
        assert_eq!(stale.cached_at, entry.cached_at);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = Record::new("player:42:inventory", 1, json!({"slots": [1, 2, 3]}));
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

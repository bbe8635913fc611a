//! Operation counters.
//!
//! Lock-free counters over the protocol's hot paths: cache hits and misses,
//! degraded reads, durable writes and deletes, store failures, and the fate
//! of incoming bus events. [`Metrics::snapshot`] yields a cheap, serializable
//! point-in-time copy for host-side reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters kept by the coordinator for the lifetime of the node.
#[derive(Debug, Default)]
pub struct Metrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stale_reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    store_failures: AtomicU64,
    events_applied: AtomicU64,
    events_discarded: AtomicU64,
}

impl Metrics {
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A read served from a `Stale` entry because the store was unreachable.
    pub(crate) fn record_stale_read(&self) {
        self.stale_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    /// An incoming update rejected as stale or duplicate.
    pub(crate) fn record_event_discarded(&self) {
        self.events_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);
        let looked_up = cache_hits + cache_misses;
        MetricsSnapshot {
            cache_hits,
            cache_misses,
            cache_hit_rate: if looked_up == 0 {
                0.0
            } else {
                cache_hits as f64 / looked_up as f64
            },
            stale_reads: self.stale_reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.stale_reads.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
        self.deletes.store(0, Ordering::Relaxed);
        self.store_failures.store(0, Ordering::Relaxed);
        self.events_applied.store(0, Ordering::Relaxed);
        self.events_discarded.store(0, Ordering::Relaxed);
    }
}

/// One consistent-enough view of the counters. `cache_hit_rate` is derived
/// at snapshot time (0.0 when nothing has been looked up yet).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub stale_reads: u64,
    pub writes: u64,
    pub deletes: u64,
    pub store_failures: u64,
    pub events_applied: u64,
    pub events_discarded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = Metrics::default();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_write();
        metrics.record_event_discarded();

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
        assert_eq!(snap.writes, 1);
        assert_eq!(snap.events_discarded, 1);
        assert_eq!(snap.events_applied, 0);
    }

    #[test]
    fn hit_rate_is_derived_and_defined_at_zero() {
        let metrics = Metrics::default();
        assert_eq!(metrics.snapshot().cache_hit_rate, 0.0);

        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        metrics.record_cache_miss();
        assert_eq!(metrics.snapshot().cache_hit_rate, 0.25);
    }

    #[test]
    fn reset_zeroes_everything() {
        let metrics = Metrics::default();
        metrics.record_cache_hit();
        metrics.record_store_failure();
        metrics.reset();

        let snap = metrics.snapshot();
        assert_eq!(snap.cache_hits, 0);
        assert_eq!(snap.store_failures, 0);
        assert_eq!(snap.cache_hit_rate, 0.0);
    }
}

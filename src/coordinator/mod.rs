//! Consistency coordinator.
//!
//! Orchestrates the store, the local cache and the bus:
//!
//! - Read: cache-fresh fast path; otherwise fetch from the store and
//!   populate back. A `Stale` entry is served only when the store is
//!   unreachable (and stays stale).
//! - Write: durable store put (the authoritative version increment), then
//!   local cache update, then broadcast. The writing node is `Fresh`
//!   immediately - read-your-writes needs no refetch.
//! - Remote events: applied on a dedicated delivery task, gated by a per-key
//!   monotonic version table so duplicates and out-of-order arrivals across
//!   publishers are discarded.
//! - Resync: after a bus outage, every cached entry degrades to `Stale` and
//!   is lazily refetched on its next read.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{BusIncoming, SyncBus, SyncEvent};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::node::NodeIdentity;
use crate::record::Record;
use crate::store::PersistentStore;

/// Callback invoked when a remote write is applied locally.
pub type RemoteChangeListener = Box<dyn Fn(&str, &Record) + Send + Sync>;

pub struct Coordinator {
    node: NodeIdentity,
    store: Arc<dyn PersistentStore>,
    bus: Arc<dyn SyncBus>,
    cache: LocalCache,
    config: Config,

    /// Highest version seen per key, from local writes, store fetches and
    /// applied events. Outlives cache eviction on purpose: an evicted key
    /// must still reject stale events. Cleared on resync sweeps.
    versions: DashMap<String, u64>,

    /// Last time each peer node was heard from.
    peers: DashMap<String, Instant>,

    listeners: RwLock<Vec<RemoteChangeListener>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: Metrics,
}

impl Coordinator {
    /// Build a coordinator over explicit collaborators. Nothing starts until
    /// [`start`](Self::start) is called.
    pub fn new(config: Config, store: Arc<dyn PersistentStore>, bus: Arc<dyn SyncBus>) -> Self {
        let node = NodeIdentity::generate(config.node_name.as_deref());
        let cache = LocalCache::new(config.cache.clone());
        Self {
            node,
            store,
            bus,
            cache,
            config,
            versions: DashMap::new(),
            peers: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            metrics: Metrics::default(),
        }
    }

    /// Subscribe to the bus and start the delivery and heartbeat tasks.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut rx = self.bus.subscribe().await?;

        let delivery = {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                while let Some(incoming) = rx.recv().await {
                    match incoming {
                        BusIncoming::Event(event) => this.apply_event(event),
                        BusIncoming::Resync => this.resync(),
                    }
                }
            })
        };

        let heartbeat = {
            let this = Arc::clone(self);
            let period = self.config.bus.heartbeat_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    if let Err(e) = this.bus.publish(SyncEvent::heartbeat(&this.node)) {
                        warn!(error = %e, "heartbeat publish failed");
                    }
                }
            })
        };

        self.tasks.lock().extend([delivery, heartbeat]);
        info!(node = %self.node, "coordinator started");
        Ok(())
    }

    /// This node's identity.
    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    /// Read a record: cache when trusted, store otherwise.
    pub async fn read(&self, key: &str) -> Result<Option<Record>> {
        if let Some(entry) = self.cache.get(key) {
            if entry.is_fresh() {
                self.metrics.record_cache_hit();
                debug!(key, "cache hit");
                return Ok(Some(entry.record));
            }
        }
        self.metrics.record_cache_miss();

        match self.store.get(key).await {
            Ok(Some(record)) => {
                self.note_version(key, record.version);
                // A remote update may have been applied while the fetch was
                // in flight; the older fetched copy must not clobber it.
                self.cache.put_fresh_if_newer(record.clone());
                debug!(key, version = record.version, "populated from store");
                Ok(Some(record))
            }
            Ok(None) => {
                self.cache.invalidate(key);
                Ok(None)
            }
            Err(e @ (Error::Unavailable(_) | Error::Transient(_))) => {
                self.metrics.record_store_failure();
                // Degraded read: a stale copy beats failing outright.
                if let Some(entry) = self.cache.get(key) {
                    self.metrics.record_stale_read();
                    warn!(key, error = %e, "store unreachable, serving stale cache entry");
                    return Ok(Some(entry.record));
                }
                Err(e)
            }
            Err(e) => {
                self.metrics.record_store_failure();
                Err(e)
            }
        }
    }

    /// Write-through: durable put, local cache update, fleet broadcast.
    pub async fn write(&self, key: &str, payload: Value) -> Result<Record> {
        let record = self
            .store
            .put(key, payload)
            .await
            .inspect_err(|_| self.metrics.record_store_failure())?;

        self.metrics.record_write();
        self.note_version(key, record.version);
        // Same guard as the read path: a remote event carrying a later
        // version may already have landed.
        self.cache.put_fresh_if_newer(record.clone());

        let event = SyncEvent::update(&self.node, key, record.version, record.payload.clone());
        if let Err(e) = self.bus.publish(event) {
            // The durable write stands; peers heal via the next resync.
            warn!(key, error = %e, "update broadcast failed");
        }

        debug!(key, version = record.version, "write accepted");
        Ok(record)
    }

    /// Delete from the store, evict locally, broadcast the invalidation.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let existed = self
            .store
            .delete(key)
            .await
            .inspect_err(|_| self.metrics.record_store_failure())?;

        self.metrics.record_delete();

        let last_version = self.versions.get(key).map(|v| *v).unwrap_or(0);
        self.cache.invalidate(key);
        self.versions.remove(key);

        if existed {
            let event = SyncEvent::invalidate(&self.node, key, last_version);
            if let Err(e) = self.bus.publish(event) {
                warn!(key, error = %e, "invalidate broadcast failed");
            }
        }
        Ok(existed)
    }

    /// Point-in-time operation counters for this node.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Register a callback for remote writes applied to the local cache.
    pub fn on_remote_change(&self, listener: impl Fn(&str, &Record) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Peer node ids heard from within the liveness window.
    pub fn peers(&self) -> Vec<String> {
        let timeout = self.config.bus.peer_timeout;
        self.peers
            .iter()
            .filter(|entry| entry.value().elapsed() < timeout)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Stop background tasks, unsubscribe the bus, drain the store pool.
    pub async fn shutdown(&self) {
        info!(node = %self.node, "coordinator shutting down");
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        self.bus.close().await;
        self.store.close().await;
    }

    /// Apply one incoming bus event. Runs on the delivery task, serially.
    pub(crate) fn apply_event(&self, event: SyncEvent) {
        if self.node.is_self(event.origin()) {
            return; // our own broadcast coming back around
        }
        self.peers
            .insert(event.origin().to_string(), Instant::now());

        match event {
            SyncEvent::Update {
                key,
                version,
                payload,
                origin,
                ..
            } => {
                // The cached copy also counts as known: the version table is
                // cleared on resync, but an entry that survived the sweep
                // must still win over an older in-flight event.
                let cached_newer = self
                    .cache
                    .get(&key)
                    .map(|entry| entry.record.version >= version)
                    .unwrap_or(false);
                if cached_newer || !self.advance_version(&key, version) {
                    self.metrics.record_event_discarded();
                    debug!(%key, version, %origin, "stale or duplicate update discarded");
                    return;
                }
                let record = Record::new(key.clone(), version, payload);
                if !self.cache.put_fresh_if_newer(record.clone()) {
                    self.metrics.record_event_discarded();
                    debug!(%key, version, %origin, "newer record cached meanwhile, update discarded");
                    return;
                }
                self.metrics.record_event_applied();
                debug!(%key, version, %origin, "remote update applied");

                for listener in self.listeners.read().iter() {
                    listener(&key, &record);
                }
            }
            SyncEvent::Invalidate { key, origin, .. } => {
                self.cache.invalidate(&key);
                self.versions.remove(&key);
                self.metrics.record_event_applied();
                debug!(%key, %origin, "remote invalidation applied");
            }
            SyncEvent::Heartbeat { .. } => {}
        }
    }

    /// Resync sweep: nothing cached can be trusted after missed events.
    fn resync(&self) {
        info!(node = %self.node, "resync sweep: degrading cache to stale");
        self.cache.mark_all_stale();
        // Next reads re-anchor versions at the store.
        self.versions.clear();
    }

    /// Record a version observed from the store or a local write.
    fn note_version(&self, key: &str, version: u64) {
        self.versions
            .entry(key.to_string())
            .and_modify(|v| *v = (*v).max(version))
            .or_insert(version);
    }

    /// Returns true (and records it) iff `version` is newer than anything
    /// seen for the key. Version stamps are the sole conflict authority.
    fn advance_version(&self, key: &str, version: u64) -> bool {
        let mut advanced = false;
        self.versions
            .entry(key.to_string())
            .and_modify(|v| {
                if version > *v {
                    *v = version;
                    advanced = true;
                }
            })
            .or_insert_with(|| {
                advanced = true;
                version
            });
        advanced
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &LocalCache {
        &self.cache
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("node", &self.node.id())
            .field("cached", &self.cache.entry_count())
            .field("known_keys", &self.versions.len())
            .finish()
    }
}

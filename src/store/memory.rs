//! In-memory persistent store.
//!
//! Serves tests and single-process embedding. Mirrors the MySQL store's
//! contract: per-key monotonic version increments under a lock, whole-record
//! replacement, and an availability switch so outages can be simulated.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::record::Record;

use super::PersistentStore;

pub struct MemoryStore {
    rows: Mutex<HashMap<String, Record>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Flip the simulated connectivity. While unavailable every operation
    /// fails with `Unavailable`, as the MySQL store does once its retry
    /// ceiling is spent.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::Unavailable("store offline".into()))
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Record>> {
        self.check_available()?;
        Ok(self.rows.lock().get(key).cloned())
    }

    async fn put(&self, key: &str, payload: Value) -> Result<Record> {
        self.check_available()?;
        let mut rows = self.rows.lock();
        let version = rows.get(key).map(|r| r.version).unwrap_or(0) + 1;
        let record = Record {
            key: key.to_string(),
            version,
            payload,
            updated_at: Utc::now(),
        };
        rows.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        Ok(self.rows.lock().remove(key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn close(&self) {}
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("rows", &self.rows.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn versions_increment_per_key() {
        let store = MemoryStore::new();
        let first = store.put("k", json!({"n": 1})).await.unwrap();
        let second = store.put("k", json!({"n": 2})).await.unwrap();
        let other = store.put("other", json!({})).await.unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(other.version, 1);
    }

    #[tokio::test]
    async fn get_reflects_the_latest_put() {
        let store = MemoryStore::new();
        store.put("k", json!({"n": 1})).await.unwrap();
        store.put("k", json!({"n": 2})).await.unwrap();

        let record = store.get("k").await.unwrap().unwrap();
        assert_eq!(record.payload, json!({"n": 2}));
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_prior_existence() {
        let store = MemoryStore::new();
        store.put("k", json!({})).await.unwrap();
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_store_rejects_everything() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.get("k").await, Err(Error::Unavailable(_))));
        assert!(matches!(
            store.put("k", json!({})).await,
            Err(Error::Unavailable(_))
        ));
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}

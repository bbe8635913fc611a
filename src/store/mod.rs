//! Persistent store - durable source of truth for records.
//!
//! The store owns version assignment: `put` atomically increments the per-key
//! version, serialized by the backend's row-level transaction. Nothing else
//! in the system ever invents a version.

mod memory;
mod mysql;
mod retry;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;
pub(crate) use retry::with_retry;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::record::Record;

/// Durable key→record storage.
///
/// All operations are linearizable with respect to each other for the same
/// key. Implementations retry `Transient` failures internally up to the
/// configured ceiling before surfacing `Unavailable`.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Fetch the current record for a key. `Ok(None)` means the key is
    /// absent, which is a valid outcome, not an error.
    async fn get(&self, key: &str) -> Result<Option<Record>>;

    /// Durably write a whole-record replacement, atomically incrementing the
    /// key's version. Returns the record as accepted by the store.
    async fn put(&self, key: &str, payload: Value) -> Result<Record>;

    /// Delete a key. Returns whether a row existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Drain connections. Idempotent.
    async fn close(&self);
}

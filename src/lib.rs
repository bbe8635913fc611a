//! fleetsync - distributed cache-consistency core.
//!
//! Gives a fleet of independent game-server processes a shared view of
//! player/account data: a relational store as the source of truth, a fast
//! per-process cache, and a pub/sub bus keeping the caches coherent.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `error` - Typed failure taxonomy
//! - `node` - Process-unique identity for loop suppression
//! - `record` - Versioned records and cache entries
//! - `cache` - Bounded TTL cache (Moka)
//! - `store` - Persistent store: MySQL (sqlx) or in-memory
//! - `bus` - Sync bus: Redis pub/sub or in-process broadcast
//! - `metrics` - Operation counters with cheap snapshots
//! - `coordinator` - The consistency protocol tying them together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use serde_json::json;
//!
//! # async fn example() -> fleetsync::Result<()> {
//! let config = fleetsync::Config::from_env();
//! let coordinator = fleetsync::init(config).await?;
//!
//! coordinator.write("player:42:balance", json!({"gold": 100})).await?;
//! let record = coordinator.read("player:42:balance").await?;
//! assert!(record.is_some());
//!
//! coordinator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod node;
pub mod record;
pub mod store;

use std::sync::Arc;

pub use bus::{MemoryBus, RedisBus, SyncBus, SyncEvent};
pub use cache::{CacheConfig, LocalCache};
pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use metrics::{Metrics, MetricsSnapshot};
pub use node::NodeIdentity;
pub use record::{CacheEntry, EntryState, Record};
pub use store::{MemoryStore, MySqlStore, PersistentStore};

/// Connect the production backends from `config` and start a coordinator.
///
/// Hosts needing different transports construct the collaborators
/// themselves and go through [`Coordinator::new`] + [`Coordinator::start`].
pub async fn init(config: Config) -> Result<Arc<Coordinator>> {
    let store = MySqlStore::connect(&config).await?;
    let bus = RedisBus::connect(&config).await?;

    let coordinator = Arc::new(Coordinator::new(
        config,
        Arc::new(store),
        Arc::new(bus),
    ));
    coordinator.start().await?;
    Ok(coordinator)
}

//! Local cache - per-process record cache built on Moka.
//!
//! One bounded, TTL-aware mapping from key to [`CacheEntry`], private to this
//! process. Only the coordinator mutates it. Eviction is LRU capacity or
//! per-entry TTL, whichever triggers first; expiry is lazy (an expired entry
//! behaves as a miss).

mod config;
mod local;

pub use config::CacheConfig;
pub use local::LocalCache;

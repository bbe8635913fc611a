//! Sync bus - fleet-wide publish/subscribe for cache coherence.
//!
//! Delivery is at-least-once; per-publisher send order is preserved by the
//! transport, but the coordinator relies on version stamps, never arrival
//! order, for correctness. `publish` is fire-and-forget: it buffers and
//! returns without waiting on peers.

mod event;
mod memory;
mod redis;

pub use event::SyncEvent;
pub use memory::MemoryBus;
pub use self::redis::RedisBus;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// What a subscriber receives on its delivery channel.
#[derive(Debug, Clone)]
pub enum BusIncoming {
    /// An event from some node in the fleet (possibly this one; the
    /// coordinator filters by origin).
    Event(SyncEvent),

    /// The transport reconnected after an outage long enough that events may
    /// have been missed. The local cache can no longer be trusted fresh.
    Resync,
}

/// Fleet-wide event channel.
///
/// Any transport with at-least-once, per-publisher-ordered delivery
/// satisfies this contract; `RedisBus` is the production implementation and
/// `MemoryBus` serves tests and single-process embedding.
#[async_trait]
pub trait SyncBus: Send + Sync {
    /// Queue an event for broadcast. Must not block on peer acknowledgment;
    /// an error means the event could not even be buffered.
    fn publish(&self, event: SyncEvent) -> Result<()>;

    /// Open this process's delivery channel. Events arrive serially, on a
    /// context separate from request-handling tasks.
    async fn subscribe(&self) -> Result<mpsc::Receiver<BusIncoming>>;

    /// Unsubscribe and stop background tasks. Idempotent.
    async fn close(&self);
}

//! In-process bus over a tokio broadcast channel.
//!
//! Used by tests and single-process embeddings. Several coordinators sharing
//! one `MemoryBus` see each other's events exactly as they would over the
//! network transport, minus the possibility of disconnects (which tests
//! inject via [`MemoryBus::trigger_resync`]).

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::error::Result;

use super::{BusIncoming, SyncBus, SyncEvent};

pub struct MemoryBus {
    tx: broadcast::Sender<BusIncoming>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            forwarders: Mutex::new(Vec::new()),
        }
    }

    /// Simulate a reconnect after a missed-events outage: every subscriber
    /// receives a `Resync` signal.
    pub fn trigger_resync(&self) {
        let _ = self.tx.send(BusIncoming::Resync);
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncBus for MemoryBus {
    fn publish(&self, event: SyncEvent) -> Result<()> {
        // No subscribers is fine; the fleet may be a single node.
        let _ = self.tx.send(BusIncoming::Event(event));
        Ok(())
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BusIncoming>> {
        let mut source = self.tx.subscribe();
        let (tx, rx) = mpsc::channel(1024);

        let handle = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(incoming) => {
                        if tx.send(incoming).await.is_err() {
                            break; // subscriber went away
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.forwarders.lock().push(handle);

        Ok(rx)
    }

    async fn close(&self) {
        for handle in self.forwarders.lock().drain(..) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBus")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeIdentity;
    use serde_json::json;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = MemoryBus::new();
        let mut a = bus.subscribe().await.unwrap();
        let mut b = bus.subscribe().await.unwrap();

        let node = NodeIdentity::generate(None);
        bus.publish(SyncEvent::update(&node, "k", 1, json!({}))).unwrap();

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                BusIncoming::Event(SyncEvent::Update { key, version, .. }) => {
                    assert_eq!(key, "k");
                    assert_eq!(version, 1);
                }
                other => panic!("unexpected delivery: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn resync_signal_is_broadcast() {
        let bus = MemoryBus::new();
        let mut rx = bus.subscribe().await.unwrap();
        bus.trigger_resync();
        assert!(matches!(rx.recv().await.unwrap(), BusIncoming::Resync));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = MemoryBus::new();
        let node = NodeIdentity::generate(None);
        assert!(bus.publish(SyncEvent::heartbeat(&node)).is_ok());
    }
}

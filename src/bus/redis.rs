//! Redis pub/sub transport.
//!
//! Two connections, as the channel contract wants them separated: a
//! `ConnectionManager`-backed publisher fed by an internal queue (so
//! `publish` never blocks the caller) and a dedicated pub/sub connection
//! driving the delivery channel. The subscriber reconnects with exponential
//! backoff; if an outage outlives the grace period, subscribers get a
//! `Resync` signal because events missed during the outage are gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{BusConfig, Config};
use crate::error::{Error, Result};

use super::{BusIncoming, SyncBus, SyncEvent};

pub struct RedisBus {
    client: redis::Client,
    channel: String,
    policy: BusConfig,
    publish_tx: mpsc::UnboundedSender<SyncEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RedisBus {
    /// Connect to Redis and start the background publisher.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| Error::InvalidConfig(format!("redis url: {e}")))?;

        // Fails fast if the server is unreachable; afterwards the manager
        // re-establishes the connection on its own.
        let manager = ConnectionManager::new(client.clone()).await?;

        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let channel = config.channel.clone();

        let publisher = tokio::spawn(publish_loop(manager, channel.clone(), publish_rx));

        info!(channel = %channel, "redis bus connected");

        Ok(Self {
            client,
            channel,
            policy: config.bus.clone(),
            publish_tx,
            tasks: Mutex::new(vec![publisher]),
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SyncBus for RedisBus {
    fn publish(&self, event: SyncEvent) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::NotRunning("bus closed".into()));
        }
        self.publish_tx
            .send(event)
            .map_err(|_| Error::Unavailable("bus publisher stopped".into()))
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<BusIncoming>> {
        let (tx, rx) = mpsc::channel(1024);
        let handle = tokio::spawn(subscribe_loop(
            self.client.clone(),
            self.channel.clone(),
            self.policy.clone(),
            tx,
        ));
        self.tasks.lock().push(handle);
        Ok(rx)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
        debug!(channel = %self.channel, "redis bus closed");
    }
}

/// Drains the publish queue onto the wire. One task, so per-publisher send
/// order is preserved.
async fn publish_loop(
    mut manager: ConnectionManager,
    channel: String,
    mut rx: mpsc::UnboundedReceiver<SyncEvent>,
) {
    while let Some(event) = rx.recv().await {
        let wire = match event.to_json() {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "unserializable event dropped");
                continue;
            }
        };
        let result: redis::RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(&wire)
            .query_async(&mut manager)
            .await;
        if let Err(e) = result {
            // Not rolled back anywhere: the durable write already won, a
            // lost broadcast only delays convergence until the next resync.
            warn!(error = %e, key = ?event.key(), "broadcast failed");
        }
    }
}

/// Owns the pub/sub connection and feeds the delivery channel, reconnecting
/// forever until the subscriber goes away.
async fn subscribe_loop(
    client: redis::Client,
    channel: String,
    policy: BusConfig,
    tx: mpsc::Sender<BusIncoming>,
) {
    let mut backoff = policy.reconnect_base;
    let mut outage_start: Option<Instant> = None;
    let mut connected_before = false;

    loop {
        match client.get_async_pubsub().await {
            Ok(mut pubsub) => {
                if let Err(e) = pubsub.subscribe(&channel).await {
                    warn!(error = %e, "pub/sub subscribe failed");
                } else {
                    backoff = policy.reconnect_base;

                    if let Some(since) = outage_start.take() {
                        if since.elapsed() > policy.resync_grace {
                            info!(outage_ms = since.elapsed().as_millis() as u64, "bus reconnected, requesting resync sweep");
                            if tx.send(BusIncoming::Resync).await.is_err() {
                                return;
                            }
                        } else {
                            debug!("bus reconnected within grace period, no resync");
                        }
                    }
                    connected_before = true;

                    let mut stream = pubsub.on_message();
                    while let Some(msg) = stream.next().await {
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(error = %e, "undecodable bus message dropped");
                                continue;
                            }
                        };
                        match SyncEvent::from_json(&payload) {
                            Ok(event) => {
                                if tx.send(BusIncoming::Event(event)).await.is_err() {
                                    return; // subscriber gone, stop
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "malformed sync event dropped");
                            }
                        }
                    }
                    warn!("pub/sub stream ended, reconnecting");
                }
            }
            Err(e) => {
                warn!(error = %e, "pub/sub connect failed");
            }
        }

        if connected_before && outage_start.is_none() {
            outage_start = Some(Instant::now());
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(policy.reconnect_max);
    }
}

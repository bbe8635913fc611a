//! fleetsync daemon.
//!
//! Thin wrapper for running the core standalone: loads environment
//! configuration, connects the backends, and keeps the node synchronized
//! until ctrl-c. Host plugin adapters embed the library directly instead.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // Default to "info" for our crate if RUST_LOG is not set
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fleetsync=info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting fleetsync node...");

    let config = fleetsync::Config::from_env();
    info!("Configuration loaded successfully");

    let coordinator = fleetsync::init(config).await?;
    info!(node = %coordinator.node(), "fleetsync node ready");

    coordinator.on_remote_change(|key, record| {
        info!(key, version = record.version, "remote change applied");
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let counters = coordinator.metrics();
    info!(
        cache_hits = counters.cache_hits,
        cache_misses = counters.cache_misses,
        writes = counters.writes,
        events_applied = counters.events_applied,
        "final counters"
    );

    coordinator.shutdown().await;
    info!("fleetsync node stopped");

    Ok(())
}

//! Broker-side feed process: subscribes to the fixtures topic and relays
//! each decoded match record to the API boundary.

use anyhow::Result;
use matchcast_backend::{ingest::FeedListener, models::FeedConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchcast_backend=info,feed_listener=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = FeedConfig::from_env()?;
    info!(
        "📡 feed listener starting, broker {}:{}",
        config.broker_host, config.broker_port
    );

    FeedListener::new(config)?.run().await
}

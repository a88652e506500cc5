//! Broker subscription: one topic, strictly sequential message handling.

use crate::ingest::dispatcher::Dispatcher;
use crate::models::FeedConfig;
use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub const FIXTURES_TOPIC: &str = "fixtures/info";

/// Envelope carried inside the double-encoded broker payload.
#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    fixtures: Vec<Value>,
}

/// Decode one broker payload into its batch of match records.
///
/// The payload is a JSON-encoded *string* whose content is the envelope
/// document. The double-encoding is part of the upstream wire contract;
/// both decode steps must succeed.
pub fn decode_batch(payload: &[u8]) -> Result<Vec<Value>> {
    let inner: String =
        serde_json::from_slice(payload).context("payload is not a JSON string")?;
    let envelope: FeedEnvelope =
        serde_json::from_str(&inner).context("inner document is not a fixtures envelope")?;
    Ok(envelope.fixtures)
}

pub struct FeedListener {
    config: FeedConfig,
    dispatcher: Dispatcher,
}

impl FeedListener {
    pub fn new(config: FeedConfig) -> Result<Self> {
        let dispatcher = Dispatcher::new(config.ingest_url.clone(), config.post_token.clone())?;
        Ok(Self { config, dispatcher })
    }

    /// Drive the subscription forever. Messages are decoded and dispatched
    /// one at a time, in arrival order; transport drops are the client's
    /// problem to reconnect, the listener has no retry of its own.
    pub async fn run(self) -> Result<()> {
        let mut options = MqttOptions::new(
            "matchcast-feed",
            self.config.broker_host.as_str(),
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(user), Some(pass)) = (&self.config.broker_user, &self.config.broker_pass) {
            options.set_credentials(user.clone(), pass.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("connected to broker with result code {:?}", ack.code);
                    // Subscribe on every CONNACK so the subscription
                    // survives reconnects.
                    client
                        .subscribe(FIXTURES_TOPIC, QoS::AtMostOnce)
                        .await
                        .context("subscribe failed")?;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match decode_batch(&publish.payload) {
                        Ok(records) => self.dispatcher.dispatch_batch(&records).await,
                        Err(e) => {
                            warn!(topic = %publish.topic, "dropping undecodable payload: {e:#}")
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("broker connection error: {e}");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }
}

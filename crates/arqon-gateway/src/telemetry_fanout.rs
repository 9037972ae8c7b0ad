//! Forwards drained telemetry events back onto the bus itself, into the
//! configured telemetry room, so any subscribed client observes broker
//! health the same way it observes any other channel.

use arqon_protocol::{Envelope, EnvelopeType};
use arqon_registry::ClientRegistry;
use arqon_telemetry::{FanOutSink, TelemetryEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

const TELEMETRY_CHANNEL: &str = "events";

pub struct BusFanOut {
    registry: Arc<ClientRegistry>,
    room: String,
}

impl BusFanOut {
    pub fn new(registry: Arc<ClientRegistry>, room: String) -> Self {
        Self { registry, room }
    }

    async fn ensure_channel(&self) -> Arc<arqon_registry::Channel> {
        let room = self.registry.rooms().get_or_create_room(&self.room).await;
        if let Some(channel) = room.get_channel(TELEMETRY_CHANNEL).await {
            return channel;
        }
        match self.registry.rooms().create_channel(&self.room, TELEMETRY_CHANNEL, None).await {
            Ok(channel) => channel,
            // Lost a creation race; the channel exists now under a read we can trust.
            Err(_) => room.get_channel(TELEMETRY_CHANNEL).await.expect("channel exists after create race"),
        }
    }
}

#[async_trait]
impl FanOutSink for BusFanOut {
    async fn send(&self, event: &TelemetryEvent) {
        let mut payload = match serde_json::to_value(event) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => return,
        };
        payload.insert("telemetry".to_string(), serde_json::Value::Bool(true));

        let envelope = Envelope::build(EnvelopeType::Telemetry)
            .with_room(&self.room)
            .with_channel(TELEMETRY_CHANNEL)
            .with_payload(payload);

        let channel = self.ensure_channel().await;
        let recipients = self.registry.broadcast(Arc::new(envelope), &channel, None).await;
        debug!(recipients, event_type = event.event_type.as_str(), "fanned out telemetry event");
    }
}

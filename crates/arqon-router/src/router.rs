use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arqon_protocol::Envelope;
use arqon_registry::ClientRegistry;
use tracing::debug;

use crate::error::{Error, Result};

/// Routing error rate above this threshold flips [`Router::health`] to
/// degraded (spec §4.4).
const DEGRADED_ERROR_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterStatus {
    Healthy,
    Degraded,
}

pub struct RouterHealth {
    pub status: RouterStatus,
    pub error_rate: f64,
    pub total_routed: u64,
    pub routing_errors: u64,
}

/// Chooses recipients for an envelope from its routing hints and fans it out
/// through the shared client registry, tracking a rolling error rate.
pub struct Router {
    registry: Arc<ClientRegistry>,
    total_routed: AtomicU64,
    routing_errors: AtomicU64,
}

impl Router {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            total_routed: AtomicU64::new(0),
            routing_errors: AtomicU64::new(0),
        }
    }

    /// Delivers `envelope` per its `room`/`channel` hints, excluding
    /// `sender_client_id`. Returns the number of recipients reached.
    pub async fn route(&self, envelope: Arc<Envelope>, sender_client_id: &str) -> Result<usize> {
        self.total_routed.fetch_add(1, Ordering::Relaxed);

        let result = match (&envelope.room, &envelope.channel) {
            (Some(room), Some(channel)) => {
                self.route_to_room_channel(envelope.clone(), sender_client_id, room, channel).await
            }
            (Some(room), None) => self.route_to_room(envelope.clone(), sender_client_id, room).await,
            (None, _) => Ok(self.route_global(envelope.clone(), sender_client_id).await),
        };

        if result.is_err() {
            self.routing_errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn route_to_room_channel(
        &self,
        envelope: Arc<Envelope>,
        sender_client_id: &str,
        room: &str,
        channel_name: &str,
    ) -> Result<usize> {
        let channel = self
            .registry
            .rooms()
            .get_channel(room, channel_name)
            .await
            .map_err(|_| Error::ChannelNotFound {
                room: room.to_string(),
                channel: channel_name.to_string(),
            })?;
        let sent = self.registry.broadcast(envelope, &channel, Some(sender_client_id)).await;
        debug!(room, channel = channel_name, sent, "routed to room:channel");
        Ok(sent)
    }

    async fn route_to_room(&self, envelope: Arc<Envelope>, sender_client_id: &str, room: &str) -> Result<usize> {
        let channels = self
            .registry
            .rooms()
            .channels_under(room)
            .await
            .map_err(|_| Error::RoomNotFound(room.to_string()))?;

        let mut total = 0;
        for channel in channels {
            total += self.registry.broadcast(envelope.clone(), &channel, Some(sender_client_id)).await;
        }
        debug!(room, sent = total, "routed to all channels in room");
        Ok(total)
    }

    async fn route_global(&self, envelope: Arc<Envelope>, sender_client_id: &str) -> usize {
        let mut sent = 0;
        for client_id in self.registry.all_client_ids().await {
            if client_id == sender_client_id {
                continue;
            }
            if self.registry.send_to(&client_id, envelope.clone()).await {
                sent += 1;
            }
        }
        debug!(sent, "routed globally");
        sent
    }

    /// Direct send bypassing room/channel routing entirely.
    pub async fn route_direct(&self, envelope: Arc<Envelope>, target_client_id: &str) -> Result<()> {
        if self.registry.send_to(target_client_id, envelope).await {
            Ok(())
        } else {
            self.routing_errors.fetch_add(1, Ordering::Relaxed);
            Err(Error::TargetUnavailable(target_client_id.to_string()))
        }
    }

    pub fn health(&self) -> RouterHealth {
        let total = self.total_routed.load(Ordering::Relaxed);
        let errors = self.routing_errors.load(Ordering::Relaxed);
        let error_rate = if total == 0 { 0.0 } else { errors as f64 / total as f64 };
        let status = if error_rate > DEGRADED_ERROR_RATE {
            RouterStatus::Degraded
        } else {
            RouterStatus::Healthy
        };
        RouterHealth { status, error_rate, total_routed: total, routing_errors: errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;
    use tokio::sync::mpsc;

    async fn registry_with_two_members() -> (Arc<ClientRegistry>, String, String) {
        let registry = Arc::new(ClientRegistry::new());
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = registry.register(tx_a, Some(("science", "general")), None).await.unwrap();
        let b = registry.register(tx_b, Some(("science", "general")), None).await.unwrap();
        (registry, a, b)
    }

    #[tokio::test]
    async fn routes_to_room_and_channel_excluding_sender() {
        let (registry, a, _b) = registry_with_two_members().await;
        let router = Router::new(registry);
        let env = Arc::new(
            Envelope::build(EnvelopeType::Message)
                .with_room("science")
                .with_channel("general")
                .with_payload(serde_json::json!({"x": 1}).as_object().unwrap().clone()),
        );
        let sent = router.route(env, &a).await.unwrap();
        assert_eq!(sent, 1);
    }

    #[tokio::test]
    async fn missing_channel_errors_and_counts_toward_rate() {
        let registry = Arc::new(ClientRegistry::new());
        let router = Router::new(registry);
        let env = Arc::new(
            Envelope::build(EnvelopeType::Message)
                .with_room("ghost-room")
                .with_channel("ghost-channel"),
        );
        let err = router.route(env, "sender").await.unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound { .. }));
        assert_eq!(router.health().routing_errors, 1);
    }

    #[tokio::test]
    async fn high_error_rate_flips_health_to_degraded() {
        let registry = Arc::new(ClientRegistry::new());
        let router = Router::new(registry);
        for _ in 0..20 {
            let env = Arc::new(Envelope::build(EnvelopeType::Message).with_room("ghost"));
            let _ = router.route(env, "sender").await;
        }
        assert_eq!(router.health().status, RouterStatus::Degraded);
    }

    #[tokio::test]
    async fn direct_send_targets_exactly_one_client() {
        let (registry, _a, b) = registry_with_two_members().await;
        let router = Router::new(registry);
        let env = Arc::new(Envelope::build(EnvelopeType::Message).with_payload(
            serde_json::json!({"x": 1}).as_object().unwrap().clone(),
        ));
        router.route_direct(env, &b).await.unwrap();
    }
}

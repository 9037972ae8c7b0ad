use std::collections::HashSet;
use std::sync::Arc;

use arqon_protocol::Envelope;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A live peer connection's outbound half. Dropping the sender is how the
/// record relinquishes its socket: the writer task on the other end sees its
/// channel close and tears the socket down, so the client record exclusively
/// owning this sender is exactly the record exclusively owning the socket.
pub type OutboundSender = mpsc::UnboundedSender<Arc<Envelope>>;

/// A registered client. Holds exactly one owning handle to its socket's
/// write half (via `sender`); membership is tracked out-of-band in the
/// channel registry, never here.
#[derive(Debug)]
pub struct ConnectedClient {
    pub client_id: String,
    sender: OutboundSender,
    pub current_room: Option<String>,
    pub current_channel: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub subscriptions: HashSet<String>,
    pub metadata: Map<String, Value>,
}

impl ConnectedClient {
    pub fn new(client_id: String, sender: OutboundSender, metadata: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            client_id,
            sender,
            current_room: None,
            current_channel: None,
            connected_at: now,
            last_activity: now,
            subscriptions: HashSet::new(),
            metadata,
        }
    }

    /// Best-effort send. Returns `false` if the peer's socket is already
    /// gone (the caller should schedule this client for cleanup).
    pub fn send(&self, envelope: Arc<Envelope>) -> bool {
        self.sender.send(envelope).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn subscription_key(room: &str, channel: &str) -> String {
        format!("{room}:{channel}")
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_fails_once_receiver_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ConnectedClient::new("c1".to_string(), tx, Map::new());
        drop(rx);
        let env = Arc::new(Envelope::build(arqon_protocol::EnvelopeType::Telemetry));
        assert!(!client.send(env));
        assert!(client.is_closed());
    }

    #[test]
    fn subscription_key_is_room_colon_channel() {
        assert_eq!(ConnectedClient::subscription_key("science", "general"), "science:general");
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use arqon_protocol::{ids, Envelope};
use chrono::Duration;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::client::{ConnectedClient, OutboundSender};
use crate::error::{Error, Result};
use crate::rooms::{Channel, RoomRegistry};

const STALE_WARN_AFTER: i64 = 60 * 60; // one hour, in seconds

/// Owns every live client record and the two-level room/channel namespace
/// they join. Locks are taken client-registry first, rooms/channels second,
/// matching the broker-wide lock ordering.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ConnectedClient>>,
    rooms: RoomRegistry,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            rooms: RoomRegistry::new(),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Registers a new client, optionally joining it to a room/channel
    /// immediately. Returns the freshly minted client id.
    pub async fn register(
        &self,
        sender: OutboundSender,
        initial: Option<(&str, &str)>,
        metadata: Option<Map<String, Value>>,
    ) -> Result<String> {
        let client_id = ids::generate_client_id();
        let mut client = ConnectedClient::new(client_id.clone(), sender, metadata.unwrap_or_default());

        if let Some((room, channel)) = initial {
            self.rooms.join(&client_id, room, channel).await?;
            client.current_room = Some(room.to_string());
            client.current_channel = Some(channel.to_string());
            client
                .subscriptions
                .insert(ConnectedClient::subscription_key(room, channel));
        }

        self.clients.write().await.insert(client_id.clone(), client);
        info!(client_id = %client_id, "client registered");
        Ok(client_id)
    }

    /// Idempotent: unregistering an already-gone client is a no-op. Tears
    /// down every membership before the record is dropped so that, once this
    /// returns, nothing references the client (P7).
    pub async fn unregister(&self, client_id: &str) {
        let mut clients = self.clients.write().await;
        let Some(client) = clients.remove(client_id) else {
            return;
        };
        drop(clients);

        for subscription in &client.subscriptions {
            if let Some((room, channel)) = subscription.split_once(':') {
                let _ = self.rooms.leave(client_id, room, channel).await;
            }
        }
        info!(client_id = %client_id, "client unregistered");
    }

    pub async fn join(&self, client_id: &str, room: &str, channel: &str) -> Result<()> {
        let mut clients = self.clients.write().await;
        let client = clients.get_mut(client_id).ok_or_else(|| Error::UnknownClient(client_id.to_string()))?;
        client.current_room = Some(room.to_string());
        client.current_channel = Some(channel.to_string());
        client.subscriptions.insert(ConnectedClient::subscription_key(room, channel));
        drop(clients);

        self.rooms.join(client_id, room, channel).await?;
        Ok(())
    }

    /// Idempotent: leaving a membership the client doesn't hold is a no-op.
    pub async fn leave(&self, client_id: &str, room: &str, channel: &str) -> Result<()> {
        {
            let mut clients = self.clients.write().await;
            if let Some(client) = clients.get_mut(client_id) {
                client.subscriptions.remove(&ConnectedClient::subscription_key(room, channel));
                if client.current_room.as_deref() == Some(room) && client.current_channel.as_deref() == Some(channel) {
                    client.current_room = None;
                    client.current_channel = None;
                }
            }
        }
        self.rooms.leave(client_id, room, channel).await
    }

    pub async fn touch(&self, client_id: &str) {
        if let Some(client) = self.clients.write().await.get_mut(client_id) {
            client.touch();
        }
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn has_client(&self, client_id: &str) -> bool {
        self.clients.read().await.contains_key(client_id)
    }

    pub async fn all_client_ids(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Sends directly to one client. Returns `false` if the client is
    /// unknown or its socket has gone away (in which case it is scheduled
    /// for cleanup).
    pub async fn send_to(&self, client_id: &str, envelope: Arc<Envelope>) -> bool {
        let ok = match self.clients.read().await.get(client_id) {
            Some(client) => client.send(envelope),
            None => return false,
        };
        if !ok {
            self.unregister(client_id).await;
        }
        ok
    }

    /// Best-effort fan-out to every member of a channel, excluding `exclude`.
    /// Sockets that have gone away are scheduled for unregister rather than
    /// retried.
    pub async fn broadcast(
        &self,
        envelope: Arc<Envelope>,
        channel: &Channel,
        exclude: Option<&str>,
    ) -> usize {
        let members = channel.members_snapshot().await;
        let mut sent = 0;
        let mut stale = Vec::new();

        let clients = self.clients.read().await;
        for member in &members {
            if Some(member.as_str()) == exclude {
                continue;
            }
            match clients.get(member) {
                Some(client) if client.send(envelope.clone()) => sent += 1,
                Some(_) => stale.push(member.clone()),
                None => stale.push(member.clone()),
            }
        }
        drop(clients);

        for client_id in stale {
            warn!(client_id = %client_id, "peer socket closed, scheduling cleanup");
            self.unregister(&client_id).await;
        }

        sent
    }

    /// Sweeps closed sockets out of the registry.
    pub async fn cleanup_stale(&self) -> usize {
        let stale: Vec<String> = self
            .clients
            .read()
            .await
            .iter()
            .filter(|(_, c)| c.is_closed())
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.unregister(id).await;
        }
        stale.len()
    }

    /// Ids of clients idle longer than one hour, for health reporting.
    pub async fn idle_beyond_one_hour(&self) -> Vec<String> {
        self.clients
            .read()
            .await
            .values()
            .filter(|c| c.idle_for() > Duration::seconds(STALE_WARN_AFTER))
            .map(|c| c.client_id.clone())
            .collect()
    }
}

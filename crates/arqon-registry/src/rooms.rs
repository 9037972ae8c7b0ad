use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use arqon_protocol::ids;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

const ROLLING_WINDOW: i64 = 24 * 60 * 60; // seconds

/// A channel's membership and rolling message-rate window. Each channel owns
/// its own lock so that joins/leaves/broadcasts on one channel never block
/// activity on a sibling channel.
pub struct Channel {
    pub channel_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    members: RwLock<HashSet<String>>,
    last_activity: RwLock<DateTime<Utc>>,
    message_times: RwLock<VecDeque<DateTime<Utc>>>,
}

impl Channel {
    fn new(name: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            channel_id: ids::generate_channel_id(),
            name,
            description,
            created_at: now,
            members: RwLock::new(HashSet::new()),
            last_activity: RwLock::new(now),
            message_times: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn add_member(&self, client_id: &str) {
        self.members.write().await.insert(client_id.to_string());
    }

    /// Idempotent: removing an absent member is a no-op.
    pub async fn remove_member(&self, client_id: &str) {
        self.members.write().await.remove(client_id);
    }

    pub async fn members_snapshot(&self) -> Vec<String> {
        self.members.read().await.iter().cloned().collect()
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Utc::now();
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    /// Records a message event for the rolling 24h rate window, pruning any
    /// entries that have aged out.
    pub async fn record_message(&self) {
        let now = Utc::now();
        let mut times = self.message_times.write().await;
        times.push_back(now);
        let cutoff = now - Duration::seconds(ROLLING_WINDOW);
        while matches!(times.front(), Some(t) if *t < cutoff) {
            times.pop_front();
        }
        drop(times);
        self.touch().await;
    }

    pub async fn message_rate_24h(&self) -> usize {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(ROLLING_WINDOW);
        self.message_times.read().await.iter().filter(|t| **t >= cutoff).count()
    }
}

/// A room: a named collection of uniquely-named channels. Exclusively owns
/// its channels (dropping the room drops every channel under it).
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    channels: RwLock<HashMap<String, Arc<Channel>>>,
}

impl Room {
    fn new(name: String, description: Option<String>) -> Self {
        Self {
            room_id: ids::generate_room_id(),
            name,
            description,
            created_at: Utc::now(),
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub async fn channel_names(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    pub async fn get_channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    pub async fn member_count(&self) -> usize {
        let channels = self.channels.read().await;
        let mut total = 0;
        for ch in channels.values() {
            total += ch.member_count().await;
        }
        total
    }
}

/// Two-level room/channel namespace. Room names are unique globally; channel
/// names are unique within their room.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a room if it doesn't already exist, returning the existing
    /// one otherwise (first-use creation semantics per the spec).
    pub async fn get_or_create_room(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(name) {
            return room.clone();
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Room::new(name.to_string(), None)))
            .clone()
    }

    pub async fn create_room(&self, name: &str, description: Option<String>) -> Result<Arc<Room>> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(Error::RoomExists(name.to_string()));
        }
        let room = Arc::new(Room::new(name.to_string(), description));
        rooms.insert(name.to_string(), room.clone());
        Ok(room)
    }

    pub async fn delete_room(&self, name: &str) -> Result<()> {
        let mut rooms = self.rooms.write().await;
        rooms.remove(name).map(|_| ()).ok_or_else(|| Error::RoomNotFound(name.to_string()))
    }

    pub async fn get_room(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    pub async fn room_names(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub async fn create_channel(
        &self,
        room_name: &str,
        channel_name: &str,
        description: Option<String>,
    ) -> Result<Arc<Channel>> {
        let room = self.get_or_create_room(room_name).await;
        let mut channels = room.channels.write().await;
        if channels.contains_key(channel_name) {
            return Err(Error::ChannelExists {
                room: room_name.to_string(),
                channel: channel_name.to_string(),
            });
        }
        let channel = Arc::new(Channel::new(channel_name.to_string(), description));
        channels.insert(channel_name.to_string(), channel.clone());
        Ok(channel)
    }

    pub async fn delete_channel(&self, room_name: &str, channel_name: &str) -> Result<()> {
        let room = self
            .get_room(room_name)
            .await
            .ok_or_else(|| Error::RoomNotFound(room_name.to_string()))?;
        let mut channels = room.channels.write().await;
        channels
            .remove(channel_name)
            .map(|_| ())
            .ok_or_else(|| Error::ChannelNotFound {
                room: room_name.to_string(),
                channel: channel_name.to_string(),
            })
    }

    pub async fn get_channel(&self, room_name: &str, channel_name: &str) -> Result<Arc<Channel>> {
        let room = self
            .get_room(room_name)
            .await
            .ok_or_else(|| Error::RoomNotFound(room_name.to_string()))?;
        room.get_channel(channel_name)
            .await
            .ok_or_else(|| Error::ChannelNotFound {
                room: room_name.to_string(),
                channel: channel_name.to_string(),
            })
    }

    /// Joins a client to a room/channel, creating either as needed
    /// (first-use creation per the spec).
    pub async fn join(&self, client_id: &str, room_name: &str, channel_name: &str) -> Result<Arc<Channel>> {
        let room = self.get_or_create_room(room_name).await;
        let channel = {
            let mut channels = room.channels.write().await;
            channels
                .entry(channel_name.to_string())
                .or_insert_with(|| Arc::new(Channel::new(channel_name.to_string(), None)))
                .clone()
        };
        channel.add_member(client_id).await;
        Ok(channel)
    }

    /// Idempotent leave: leaving an absent membership (or a room/channel
    /// that no longer exists) is a no-op, never an error.
    pub async fn leave(&self, client_id: &str, room_name: &str, channel_name: &str) -> Result<()> {
        if let Ok(channel) = self.get_channel(room_name, channel_name).await {
            channel.remove_member(client_id).await;
        }
        Ok(())
    }

    pub async fn channels_under(&self, room_name: &str) -> Result<Vec<Arc<Channel>>> {
        let room = self.get_room(room_name).await.ok_or_else(|| Error::RoomNotFound(room_name.to_string()))?;
        Ok(room.channels.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_then_leave_restores_prior_membership() {
        let registry = RoomRegistry::new();
        let channel = registry.join("c1", "science", "general").await.unwrap();
        assert_eq!(channel.member_count().await, 1);
        registry.leave("c1", "science", "general").await.unwrap();
        assert_eq!(channel.member_count().await, 0);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = RoomRegistry::new();
        registry.join("c1", "science", "general").await.unwrap();
        registry.leave("c1", "science", "general").await.unwrap();
        registry.leave("c1", "science", "general").await.unwrap();
        let channel = registry.get_channel("science", "general").await.unwrap();
        assert_eq!(channel.member_count().await, 0);
    }

    #[tokio::test]
    async fn channel_names_are_unique_within_a_room() {
        let registry = RoomRegistry::new();
        registry.create_channel("science", "general", None).await.unwrap();
        let err = registry.create_channel("science", "general", None).await.unwrap_err();
        assert!(matches!(err, Error::ChannelExists { .. }));
    }

    #[tokio::test]
    async fn message_rate_tracks_recent_activity() {
        let channel = Channel::new("general".to_string(), None);
        channel.record_message().await;
        channel.record_message().await;
        assert_eq!(channel.message_rate_24h().await, 2);
    }

    #[tokio::test]
    async fn delete_missing_room_is_an_error() {
        let registry = RoomRegistry::new();
        let err = registry.delete_room("ghost").await.unwrap_err();
        assert!(matches!(err, Error::RoomNotFound(_)));
    }
}

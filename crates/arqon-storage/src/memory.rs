use std::collections::{HashMap, VecDeque};

use arqon_protocol::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::result::{HistoryEntry, HistoryQuery, StorageResult};

const DEFAULT_ROOM: &str = "default";
const DEFAULT_CHANNEL: &str = "default";

struct Inner {
    messages: HashMap<String, HashMap<String, VecDeque<HistoryEntry>>>,
    index: HashMap<String, (String, String)>,
    total_messages: u64,
}

/// In-memory storage backend. All messages live only for the life of the
/// process; ideal for development, tests, and as the fallback every other
/// backend degrades to.
pub struct MemoryBackend {
    max_size: usize,
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: RwLock::new(Inner { messages: HashMap::new(), index: HashMap::new(), total_messages: 0 }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn append(&self, envelope: &Envelope) -> Result<StorageResult> {
        let room = envelope.room.clone().unwrap_or_else(|| DEFAULT_ROOM.to_string());
        let channel = envelope.channel.clone().unwrap_or_else(|| DEFAULT_CHANNEL.to_string());
        let stored_at = Utc::now();

        let entry = HistoryEntry {
            envelope: envelope.clone(),
            stored_at,
            storage_metadata: HashMap::from([("backend".to_string(), "memory".to_string())]),
        };

        let mut inner = self.inner.write().await;
        let bucket = inner.messages.entry(room.clone()).or_default().entry(channel.clone()).or_default();
        bucket.push_back(entry);

        while bucket.len() > self.max_size {
            if let Some(old) = bucket.pop_front() {
                inner.index.remove(&old.envelope.id);
            }
        }

        inner.index.insert(envelope.id.clone(), (room.clone(), channel.clone()));
        inner.total_messages += 1;
        debug!(id = %envelope.id, room, channel, "stored message in memory backend");

        Ok(StorageResult::ok(envelope.id.clone(), stored_at))
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        let inner = self.inner.read().await;
        let mut results = Vec::new();
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };

        let rooms: Vec<&String> = match &query.room {
            Some(room) => inner.messages.keys().filter(|r| *r == room).collect(),
            None => inner.messages.keys().collect(),
        };

        'rooms: for room in rooms {
            let Some(channels) = inner.messages.get(room) else { continue };
            let channel_names: Vec<&String> = match &query.channel {
                Some(channel) => channels.keys().filter(|c| *c == channel).collect(),
                None => channels.keys().collect(),
            };
            for channel_name in channel_names {
                let Some(bucket) = channels.get(channel_name) else { continue };
                for entry in bucket.iter().rev() {
                    if let Some(since) = query.since {
                        if entry.stored_at <= since {
                            continue;
                        }
                    }
                    if let Some(until) = query.until {
                        if entry.stored_at >= until {
                            continue;
                        }
                    }
                    results.push(entry.clone());
                    if results.len() >= limit {
                        break 'rooms;
                    }
                }
            }
        }

        Ok(results)
    }

    async fn delete_message(&self, message_id: &str) -> Result<StorageResult> {
        let mut inner = self.inner.write().await;
        let Some((room, channel)) = inner.index.remove(message_id) else {
            return Ok(StorageResult::failed(Some(message_id.to_string()), "message not found"));
        };

        if let Some(channels) = inner.messages.get_mut(&room) {
            if let Some(bucket) = channels.get_mut(&channel) {
                bucket.retain(|e| e.envelope.id != message_id);
            }
        }
        inner.total_messages = inner.total_messages.saturating_sub(1);

        Ok(StorageResult::ok(message_id, Utc::now()))
    }

    async fn clear_history(&self, room: Option<&str>, channel: Option<&str>, before: Option<DateTime<Utc>>) -> Result<StorageResult> {
        let mut inner = self.inner.write().await;
        let mut cleared = 0usize;

        let room_keys: Vec<String> = match room {
            Some(r) => vec![r.to_string()],
            None => inner.messages.keys().cloned().collect(),
        };

        for room_key in room_keys {
            let Some(channels) = inner.messages.get_mut(&room_key) else { continue };
            let channel_keys: Vec<String> = match channel {
                Some(c) => vec![c.to_string()],
                None => channels.keys().cloned().collect(),
            };

            for channel_key in channel_keys {
                let Some(bucket) = channels.get_mut(&channel_key) else { continue };
                let kept: VecDeque<HistoryEntry> = bucket
                    .drain(..)
                    .filter_map(|entry| {
                        let remove = before.map(|cutoff| entry.stored_at < cutoff).unwrap_or(true);
                        if remove {
                            cleared += 1;
                            None
                        } else {
                            Some(entry)
                        }
                    })
                    .collect();
                *bucket = kept;
            }
            channels.retain(|_, bucket| !bucket.is_empty());
        }

        inner.index.retain(|_, (room_key, channel_key)| {
            inner
                .messages
                .get(room_key)
                .and_then(|channels| channels.get(channel_key))
                .is_some()
        });
        inner.total_messages = inner.total_messages.saturating_sub(cleared as u64);

        Ok(StorageResult::ok("cleared", Utc::now()).with_metadata("cleared_count", cleared.to_string()))
    }

    async fn stats(&self) -> Result<HashMap<String, String>> {
        let inner = self.inner.read().await;
        Ok(HashMap::from([
            ("backend_type".to_string(), "memory".to_string()),
            ("total_messages".to_string(), inner.total_messages.to_string()),
            ("rooms".to_string(), inner.messages.len().to_string()),
            ("max_size".to_string(), self.max_size.to_string()),
        ]))
    }

    async fn health_check(&self) -> bool {
        let inner = self.inner.read().await;
        inner.index.len() <= self.max_size
    }

    async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.messages.clear();
        inner.index.clear();
        inner.total_messages = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    fn message(room: &str, channel: &str) -> Envelope {
        Envelope::build(EnvelopeType::Message)
            .with_room(room)
            .with_channel(channel)
            .with_payload(serde_json::json!({"x": 1}).as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn append_then_history_returns_most_recent_first() {
        let backend = MemoryBackend::new(10);
        let first = message("science", "general");
        let second = message("science", "general");
        backend.append(&first).await.unwrap();
        backend.append(&second).await.unwrap();

        let history = backend.get_history(&HistoryQuery::with_limit(10)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].envelope.id, second.id);
    }

    #[tokio::test]
    async fn size_limit_evicts_oldest_message() {
        let backend = MemoryBackend::new(1);
        let first = message("science", "general");
        let second = message("science", "general");
        backend.append(&first).await.unwrap();
        backend.append(&second).await.unwrap();

        let history = backend.get_history(&HistoryQuery::with_limit(10)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].envelope.id, second.id);
    }

    #[tokio::test]
    async fn delete_removes_from_index_and_history() {
        let backend = MemoryBackend::new(10);
        let env = message("science", "general");
        backend.append(&env).await.unwrap();
        let result = backend.delete_message(&env.id).await.unwrap();
        assert!(result.success);

        let history = backend.get_history(&HistoryQuery::with_limit(10)).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn clear_history_without_before_clears_everything() {
        let backend = MemoryBackend::new(10);
        backend.append(&message("science", "general")).await.unwrap();
        backend.append(&message("science", "other")).await.unwrap();
        let result = backend.clear_history(Some("science"), None, None).await.unwrap();
        assert_eq!(result.metadata.get("cleared_count").unwrap(), "2");

        let history = backend.get_history(&HistoryQuery::with_limit(10)).await.unwrap();
        assert!(history.is_empty());
    }
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arqon_protocol::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::backend::{ConsumerGroupStore, StorageBackend};
use crate::error::{Error, Result};
use crate::memory::MemoryBackend;
use crate::result::{HistoryEntry, HistoryQuery, StorageResult};

/// Redis Streams-backed storage. Degrades to an in-process [`MemoryBackend`]
/// whenever the Redis connection is unavailable; in strict mode a failed
/// operation instead propagates [`Error::Strict`].
pub struct LogStreamBackend {
    client: Option<Mutex<redis::aio::ConnectionManager>>,
    fallback: MemoryBackend,
    strict_mode: bool,
    stream_prefix: String,
    history_limit: usize,
    redis_operations: AtomicU64,
    fallback_operations: AtomicU64,
    degraded: AtomicBool,
}

impl LogStreamBackend {
    /// Attempts to connect to `redis_url`. On failure, falls back to memory
    /// storage unless `strict_mode` is set, in which case the connection
    /// error is returned so the caller can refuse to start.
    pub async fn connect(
        redis_url: &str,
        strict_mode: bool,
        stream_prefix: impl Into<String>,
        history_limit: usize,
        fallback_max_size: usize,
    ) -> Result<Self> {
        let stream_prefix = stream_prefix.into();
        match redis::Client::open(redis_url) {
            Ok(client) => match redis::aio::ConnectionManager::new(client).await {
                Ok(manager) => {
                    info!(redis_url, "connected to redis streams backend");
                    Ok(Self {
                        client: Some(Mutex::new(manager)),
                        fallback: MemoryBackend::new(fallback_max_size),
                        strict_mode,
                        stream_prefix,
                        history_limit,
                        redis_operations: AtomicU64::new(0),
                        fallback_operations: AtomicU64::new(0),
                        degraded: AtomicBool::new(false),
                    })
                }
                Err(e) => Self::failed_connection(e, strict_mode, stream_prefix, history_limit, fallback_max_size),
            },
            Err(e) => Self::failed_connection(e, strict_mode, stream_prefix, history_limit, fallback_max_size),
        }
    }

    fn failed_connection(
        error: redis::RedisError,
        strict_mode: bool,
        stream_prefix: String,
        history_limit: usize,
        fallback_max_size: usize,
    ) -> Result<Self> {
        if strict_mode {
            return Err(Error::Strict(format!("redis connection failed in strict storage mode: {error}")));
        }
        warn!(%error, "redis unavailable, falling back to memory storage");
        Ok(Self {
            client: None,
            fallback: MemoryBackend::new(fallback_max_size),
            strict_mode,
            stream_prefix,
            history_limit,
            redis_operations: AtomicU64::new(0),
            fallback_operations: AtomicU64::new(0),
            degraded: AtomicBool::new(true),
        })
    }

    /// Constructs a backend that never attempts a connection, running
    /// purely on the in-process fallback. Used when configuration omits a
    /// log-stream URL in degraded mode, and by tests.
    pub fn degraded(stream_prefix: impl Into<String>, history_limit: usize, fallback_max_size: usize) -> Self {
        Self {
            client: None,
            fallback: MemoryBackend::new(fallback_max_size),
            strict_mode: false,
            stream_prefix: stream_prefix.into(),
            history_limit,
            redis_operations: AtomicU64::new(0),
            fallback_operations: AtomicU64::new(0),
            degraded: AtomicBool::new(true),
        }
    }

    fn messages_stream(&self) -> String {
        format!("{}:messages", self.stream_prefix)
    }

    fn room_stream(&self, room: &str) -> String {
        format!("{}:room_{room}", self.stream_prefix)
    }

    fn channel_stream(&self, channel: &str) -> String {
        format!("{}:channel_{channel}", self.stream_prefix)
    }

    async fn handle_failure(&self, error: &redis::RedisError) -> Result<()> {
        self.degraded.store(true, Ordering::Relaxed);
        if self.strict_mode {
            return Err(Error::Strict(format!("redis operation failed in strict storage mode: {error}")));
        }
        error!(%error, "redis operation failed, degrading");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LogStreamBackend {
    async fn append(&self, envelope: &Envelope) -> Result<StorageResult> {
        let Some(client) = &self.client else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.append(envelope).await;
        };

        self.redis_operations.fetch_add(1, Ordering::Relaxed);
        let fields: Vec<(&str, String)> = vec![
            ("id", envelope.id.clone()),
            ("type", envelope.kind.as_str().to_string()),
            ("timestamp", envelope.timestamp.to_rfc3339()),
            ("sender", envelope.sender.clone().unwrap_or_default()),
            ("room", envelope.room.clone().unwrap_or_default()),
            ("channel", envelope.channel.clone().unwrap_or_default()),
            ("payload", serde_json::to_string(&envelope.payload)?),
        ];

        let mut conn = client.lock().await;
        let main_stream = self.messages_stream();
        let outcome: std::result::Result<String, redis::RedisError> =
            conn.xadd(&main_stream, "*", &fields).await;

        if let Err(e) = outcome {
            drop(conn);
            self.handle_failure(&e).await?;
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.append(envelope).await;
        }

        if let Some(room) = &envelope.room {
            let _: std::result::Result<String, redis::RedisError> =
                conn.xadd(&self.room_stream(room), "*", &fields).await;
        }
        if let Some(channel) = &envelope.channel {
            let _: std::result::Result<String, redis::RedisError> =
                conn.xadd(&self.channel_stream(channel), "*", &fields).await;
        }

        debug!(id = %envelope.id, "stored message in redis streams backend");
        Ok(StorageResult::ok(envelope.id.clone(), Utc::now()))
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        let Some(client) = &self.client else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.get_history(query).await;
        };

        self.redis_operations.fetch_add(1, Ordering::Relaxed);
        let stream_name = match (&query.room, &query.channel) {
            (Some(room), Some(_)) => self.room_stream(room),
            (Some(room), None) => self.room_stream(room),
            (None, Some(channel)) => self.channel_stream(channel),
            (None, None) => self.messages_stream(),
        };

        let count = query.limit.min(self.history_limit).max(1);
        let mut conn = client.lock().await;
        let rows: std::result::Result<Vec<(String, HashMap<String, String>)>, redis::RedisError> =
            conn.xrange_count(&stream_name, "-", "+", count).await;
        drop(conn);

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                self.handle_failure(&e).await?;
                self.fallback_operations.fetch_add(1, Ordering::Relaxed);
                return self.fallback.get_history(query).await;
            }
        };

        let mut entries = Vec::new();
        for (_id, data) in rows {
            let timestamp = data
                .get("timestamp")
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);

            if let Some(since) = query.since {
                if timestamp <= since {
                    continue;
                }
            }
            if let Some(until) = query.until {
                if timestamp >= until {
                    continue;
                }
            }

            let payload = data
                .get("payload")
                .and_then(|p| serde_json::from_str(p).ok())
                .unwrap_or_default();

            let envelope = Envelope {
                id: data.get("id").cloned().unwrap_or_default(),
                timestamp,
                kind: arqon_protocol::EnvelopeType::Message,
                version: arqon_protocol::PROTOCOL_VERSION.to_string(),
                room: data.get("room").filter(|s| !s.is_empty()).cloned(),
                channel: data.get("channel").filter(|s| !s.is_empty()).cloned(),
                sender: data.get("sender").filter(|s| !s.is_empty()).cloned(),
                to_client: None,
                from_client: None,
                payload,
                command: None,
                args: Default::default(),
                request_id: None,
                status: None,
                error: None,
                error_code: None,
                metadata: Default::default(),
            };

            entries.push(HistoryEntry {
                envelope,
                stored_at: timestamp,
                storage_metadata: HashMap::from([("backend".to_string(), "log_stream".to_string())]),
            });
            if entries.len() >= query.limit.max(1) {
                break;
            }
        }

        Ok(entries)
    }

    async fn delete_message(&self, message_id: &str) -> Result<StorageResult> {
        // Streams aren't indexed by application message id; delegate to the
        // in-process fallback, matching the source's behavior.
        self.fallback_operations.fetch_add(1, Ordering::Relaxed);
        self.fallback.delete_message(message_id).await
    }

    async fn clear_history(&self, room: Option<&str>, channel: Option<&str>, before: Option<DateTime<Utc>>) -> Result<StorageResult> {
        self.fallback_operations.fetch_add(1, Ordering::Relaxed);
        self.fallback.clear_history(room, channel, before).await
    }

    async fn stats(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([
            ("backend_type".to_string(), "log_stream".to_string()),
            ("redis_available".to_string(), self.client.is_some().to_string()),
            ("degraded_mode_active".to_string(), self.degraded.load(Ordering::Relaxed).to_string()),
            ("redis_operations".to_string(), self.redis_operations.load(Ordering::Relaxed).to_string()),
            ("fallback_operations".to_string(), self.fallback_operations.load(Ordering::Relaxed).to_string()),
            ("stream_prefix".to_string(), self.stream_prefix.clone()),
        ]))
    }

    async fn health_check(&self) -> bool {
        let Some(client) = &self.client else {
            return self.fallback.health_check().await;
        };
        let mut conn = client.lock().await;
        redis::cmd("PING").query_async::<_, String>(&mut *conn).await.is_ok()
    }

    async fn close(&self) {
        self.fallback.close().await;
    }
}

#[async_trait]
impl ConsumerGroupStore for LogStreamBackend {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()> {
        let Some(client) = &self.client else {
            return Err(Error::ConsumerGroupsUnsupported);
        };
        let mut conn = client.lock().await;
        let result: std::result::Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut *conn)
            .await;
        match result {
            Ok(()) => {
                info!(stream, group, "created consumer group");
                Ok(())
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(Error::Redis(e)),
        }
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, HashMap<String, String>)>> {
        let Some(client) = &self.client else {
            return Err(Error::ConsumerGroupsUnsupported);
        };
        let mut conn = client.lock().await;
        let opts = redis::streams::StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block_ms as usize);
        let reply: redis::streams::StreamReadReply =
            conn.xread_options(&[stream], &[">"], &opts).await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for id in key.ids {
                let mut data = HashMap::new();
                for (field, value) in id.map {
                    if let redis::Value::BulkString(bytes) = value {
                        data.insert(field, String::from_utf8_lossy(&bytes).to_string());
                    }
                }
                out.push((id.id, data));
            }
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, group: &str, message_ids: &[String]) -> Result<()> {
        let Some(client) = &self.client else {
            return Err(Error::ConsumerGroupsUnsupported);
        };
        if message_ids.is_empty() {
            return Ok(());
        }
        let mut conn = client.lock().await;
        let _: i64 = conn.xack(stream, group, message_ids).await?;
        Ok(())
    }

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<String>> {
        let Some(client) = &self.client else {
            return Err(Error::ConsumerGroupsUnsupported);
        };
        let mut conn = client.lock().await;
        let reply: redis::streams::StreamPendingCountReply = conn
            .xpending_count(stream, group, "-", "+", 100)
            .await?;
        Ok(reply.ids.into_iter().map(|entry| entry.id).collect())
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        message_ids: &[String],
    ) -> Result<Vec<(String, HashMap<String, String>)>> {
        let Some(client) = &self.client else {
            return Err(Error::ConsumerGroupsUnsupported);
        };
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = client.lock().await;
        let reply: redis::streams::StreamClaimReply = conn
            .xclaim(stream, group, consumer, min_idle_ms, message_ids)
            .await?;

        let mut out = Vec::new();
        for id in reply.ids {
            let mut data = HashMap::new();
            for (field, value) in id.map {
                if let redis::Value::BulkString(bytes) = value {
                    data.insert(field, String::from_utf8_lossy(&bytes).to_string());
                }
            }
            out.push((id.id, data));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    #[tokio::test]
    async fn degraded_backend_appends_through_fallback() {
        let backend = LogStreamBackend::degraded("arqonbus", 100, 10);
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"x": 1}).as_object().unwrap().clone());

        let result = backend.append(&env).await.unwrap();
        assert!(result.success);
        assert_eq!(backend.fallback_operations.load(Ordering::Relaxed), 1);

        let history = backend.get_history(&HistoryQuery::with_limit(10)).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn degraded_backend_rejects_consumer_group_calls() {
        let backend = LogStreamBackend::degraded("arqonbus", 100, 10);
        let err = backend.ensure_group("stream", "group").await.unwrap_err();
        assert!(matches!(err, Error::ConsumerGroupsUnsupported));
    }

    #[tokio::test]
    async fn degraded_backend_reports_health_via_fallback() {
        let backend = LogStreamBackend::degraded("arqonbus", 100, 10);
        assert!(backend.health_check().await);
    }
}

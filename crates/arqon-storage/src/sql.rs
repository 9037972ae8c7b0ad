use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use arqon_protocol::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::memory::MemoryBackend;
use crate::result::{HistoryEntry, HistoryQuery, StorageResult};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS arqonbus_message_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT UNIQUE NOT NULL,
    room TEXT NOT NULL,
    channel TEXT NOT NULL,
    sender TEXT,
    stored_at TEXT NOT NULL,
    envelope TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_arqonbus_room_channel_stored_at
  ON arqonbus_message_history (room, channel, stored_at DESC);
"#;

/// SQL-backed message history, mirroring the source's Postgres backend but
/// speaking through `sqlx` against whatever database the connection URL
/// names. Degrades to [`MemoryBackend`] on connection failure unless
/// `strict_mode` is set.
pub struct SqlBackend {
    pool: Option<SqlitePool>,
    fallback: MemoryBackend,
    strict_mode: bool,
    sql_operations: AtomicU64,
    fallback_operations: AtomicU64,
    degraded: AtomicBool,
}

impl SqlBackend {
    pub async fn connect(database_url: &str, strict_mode: bool, fallback_max_size: usize) -> Result<Self> {
        match SqlitePoolOptions::new().max_connections(10).connect(database_url).await {
            Ok(pool) => {
                sqlx::query(SCHEMA).execute(&pool).await?;
                info!(database_url, "connected to sql storage backend");
                Ok(Self {
                    pool: Some(pool),
                    fallback: MemoryBackend::new(fallback_max_size),
                    strict_mode,
                    sql_operations: AtomicU64::new(0),
                    fallback_operations: AtomicU64::new(0),
                    degraded: AtomicBool::new(false),
                })
            }
            Err(e) => {
                if strict_mode {
                    return Err(Error::Strict(format!("sql connection failed in strict storage mode: {e}")));
                }
                warn!(error = %e, "sql backend unavailable, falling back to memory storage");
                Ok(Self {
                    pool: None,
                    fallback: MemoryBackend::new(fallback_max_size),
                    strict_mode,
                    sql_operations: AtomicU64::new(0),
                    fallback_operations: AtomicU64::new(0),
                    degraded: AtomicBool::new(true),
                })
            }
        }
    }

    /// Constructs a backend that never attempts a connection, running
    /// purely on the in-process fallback. Used when configuration omits a
    /// SQL URL in degraded mode, and by tests.
    pub fn degraded(fallback_max_size: usize) -> Self {
        Self {
            pool: None,
            fallback: MemoryBackend::new(fallback_max_size),
            strict_mode: false,
            sql_operations: AtomicU64::new(0),
            fallback_operations: AtomicU64::new(0),
            degraded: AtomicBool::new(true),
        }
    }

    async fn handle_failure(&self, error: &sqlx::Error) -> Result<()> {
        self.degraded.store(true, Ordering::Relaxed);
        if self.strict_mode {
            return Err(Error::Strict(format!("sql operation failed in strict storage mode: {error}")));
        }
        warn!(%error, "sql operation failed, degrading");
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqlBackend {
    async fn append(&self, envelope: &Envelope) -> Result<StorageResult> {
        let Some(pool) = &self.pool else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.append(envelope).await;
        };

        self.sql_operations.fetch_add(1, Ordering::Relaxed);
        let room = envelope.room.clone().unwrap_or_else(|| "default".to_string());
        let channel = envelope.channel.clone().unwrap_or_else(|| "default".to_string());
        let stored_at = Utc::now();
        let envelope_json = envelope.to_json()?;

        let outcome = sqlx::query(
            "INSERT OR IGNORE INTO arqonbus_message_history (message_id, room, channel, sender, stored_at, envelope) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&envelope.id)
        .bind(&room)
        .bind(&channel)
        .bind(&envelope.sender)
        .bind(stored_at.to_rfc3339())
        .bind(&envelope_json)
        .execute(pool)
        .await;

        match outcome {
            Ok(_) => Ok(StorageResult::ok(envelope.id.clone(), stored_at)),
            Err(e) => {
                self.handle_failure(&e).await?;
                self.fallback_operations.fetch_add(1, Ordering::Relaxed);
                self.fallback.append(envelope).await
            }
        }
    }

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>> {
        let Some(pool) = &self.pool else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.get_history(query).await;
        };

        self.sql_operations.fetch_add(1, Ordering::Relaxed);
        let limit = if query.limit == 0 { 100 } else { query.limit } as i64;

        let rows = sqlx::query(
            "SELECT envelope, stored_at FROM arqonbus_message_history \
             WHERE (?1 IS NULL OR room = ?1) AND (?2 IS NULL OR channel = ?2) \
             ORDER BY stored_at DESC LIMIT ?3",
        )
        .bind(query.room.as_deref())
        .bind(query.channel.as_deref())
        .bind(limit)
        .fetch_all(pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                self.handle_failure(&e).await?;
                self.fallback_operations.fetch_add(1, Ordering::Relaxed);
                return self.fallback.get_history(query).await;
            }
        };

        let mut entries = Vec::new();
        for row in rows {
            let envelope_json: String = row.try_get("envelope")?;
            let stored_at_str: String = row.try_get("stored_at")?;
            let Ok(envelope) = Envelope::from_json(&envelope_json) else { continue };
            let stored_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&stored_at_str)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());

            if let Some(since) = query.since {
                if stored_at <= since {
                    continue;
                }
            }
            if let Some(until) = query.until {
                if stored_at >= until {
                    continue;
                }
            }

            entries.push(HistoryEntry {
                envelope,
                stored_at,
                storage_metadata: HashMap::from([("backend".to_string(), "sql".to_string())]),
            });
        }

        Ok(entries)
    }

    async fn delete_message(&self, message_id: &str) -> Result<StorageResult> {
        let Some(pool) = &self.pool else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.delete_message(message_id).await;
        };

        self.sql_operations.fetch_add(1, Ordering::Relaxed);
        let outcome = sqlx::query("DELETE FROM arqonbus_message_history WHERE message_id = ?")
            .bind(message_id)
            .execute(pool)
            .await;

        match outcome {
            Ok(result) if result.rows_affected() > 0 => Ok(StorageResult::ok(message_id, Utc::now())),
            Ok(_) => Ok(StorageResult::failed(Some(message_id.to_string()), "message not found")),
            Err(e) => {
                self.handle_failure(&e).await?;
                self.fallback_operations.fetch_add(1, Ordering::Relaxed);
                self.fallback.delete_message(message_id).await
            }
        }
    }

    async fn clear_history(&self, room: Option<&str>, channel: Option<&str>, before: Option<DateTime<Utc>>) -> Result<StorageResult> {
        let Some(pool) = &self.pool else {
            self.fallback_operations.fetch_add(1, Ordering::Relaxed);
            return self.fallback.clear_history(room, channel, before).await;
        };

        self.sql_operations.fetch_add(1, Ordering::Relaxed);
        let before_str = before.map(|b| b.to_rfc3339());
        let outcome = sqlx::query(
            "DELETE FROM arqonbus_message_history \
             WHERE (?1 IS NULL OR room = ?1) AND (?2 IS NULL OR channel = ?2) AND (?3 IS NULL OR stored_at < ?3)",
        )
        .bind(room)
        .bind(channel)
        .bind(before_str)
        .execute(pool)
        .await;

        match outcome {
            Ok(result) => Ok(StorageResult::ok("cleared", Utc::now())
                .with_metadata("cleared_count", result.rows_affected().to_string())),
            Err(e) => {
                self.handle_failure(&e).await?;
                self.fallback_operations.fetch_add(1, Ordering::Relaxed);
                self.fallback.clear_history(room, channel, before).await
            }
        }
    }

    async fn stats(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::from([
            ("backend_type".to_string(), "sql".to_string()),
            ("sql_available".to_string(), self.pool.is_some().to_string()),
            ("degraded_mode_active".to_string(), self.degraded.load(Ordering::Relaxed).to_string()),
            ("sql_operations".to_string(), self.sql_operations.load(Ordering::Relaxed).to_string()),
            ("fallback_operations".to_string(), self.fallback_operations.load(Ordering::Relaxed).to_string()),
        ]))
    }

    async fn health_check(&self) -> bool {
        let Some(pool) = &self.pool else {
            return self.fallback.health_check().await;
        };
        sqlx::query("SELECT 1").execute(pool).await.is_ok()
    }

    async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
        self.fallback.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    #[tokio::test]
    async fn degraded_backend_appends_through_fallback() {
        let backend = SqlBackend::degraded(10);
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
    async fn degraded_backend_reports_health_via_fallback() {
        let backend = SqlBackend::degraded(10);
        assert!(backend.health_check().await);
    }
}

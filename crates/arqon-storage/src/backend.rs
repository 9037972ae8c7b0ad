use std::collections::HashMap;

use arqon_protocol::Envelope;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::result::{HistoryEntry, HistoryQuery, StorageResult};

/// Common capability every storage backend implements, matching the
/// source's `StorageBackend` abstract base class.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn append(&self, envelope: &Envelope) -> Result<StorageResult>;

    async fn get_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryEntry>>;

    async fn delete_message(&self, message_id: &str) -> Result<StorageResult>;

    async fn clear_history(&self, room: Option<&str>, channel: Option<&str>, before: Option<DateTime<Utc>>) -> Result<StorageResult>;

    async fn stats(&self) -> Result<HashMap<String, String>>;

    async fn health_check(&self) -> bool;

    async fn close(&self);
}

/// Extended capability only the consumer-group-aware (log-stream) backend
/// provides. Calling these against a backend that doesn't support them
/// returns [`crate::error::Error::ConsumerGroupsUnsupported`].
#[async_trait]
pub trait ConsumerGroupStore: Send + Sync {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<()>;

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> Result<Vec<(String, HashMap<String, String>)>>;

    async fn ack(&self, stream: &str, group: &str, message_ids: &[String]) -> Result<()>;

    async fn pending(&self, stream: &str, group: &str) -> Result<Vec<String>>;

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        message_ids: &[String],
    ) -> Result<Vec<(String, HashMap<String, String>)>>;
}

use arqon_protocol::Envelope;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Outcome of a single storage operation, kept deliberately close to
/// `StorageResult` in the source so backends stay interchangeable at the
/// call site.
#[derive(Debug, Clone)]
pub struct StorageResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl StorageResult {
    pub fn ok(message_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            timestamp: Some(timestamp),
            error_message: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(message_id: Option<String>, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id,
            timestamp: None,
            error_message: Some(error_message.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// One stored message plus the bookkeeping the backend attached to it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub envelope: Envelope,
    pub stored_at: DateTime<Utc>,
    pub storage_metadata: HashMap<String, String>,
}

/// Filters accepted by [`crate::backend::StorageBackend::get_history`] and
/// [`crate::backend::StorageBackend::clear_history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub room: Option<String>,
    pub channel: Option<String>,
    pub limit: usize,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit, ..Default::default() }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Event severity, independent of `tracing`'s levels so telemetry
/// consumers don't need a `tracing` subscriber to interpret a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// The catalog of event types the emitter knows how to produce. Kept as
/// a closed enum (rather than a free-form string) so callers can't typo
/// an event type; [`EventType::as_str`] is what actually goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Client lifecycle
    ClientConnected,
    ClientDisconnected,
    ClientAuthenticated,
    ClientAuthorized,
    ClientRateLimited,

    // Message lifecycle
    MessageSent,
    MessageReceived,
    MessageRouted,
    MessageFailed,
    MessageHistoryRetrieved,

    // Room and channel lifecycle
    RoomCreated,
    RoomDeleted,
    ChannelCreated,
    ChannelDeleted,
    ClientJoinedRoom,
    ClientLeftRoom,
    ClientJoinedChannel,
    ClientLeftChannel,

    // Command lifecycle
    CommandExecuted,
    CommandSucceeded,
    CommandFailed,
    CommandRateLimited,

    // System lifecycle
    SystemStarted,
    SystemStopped,
    SystemError,
    SystemWarning,
    SystemInfo,

    // Storage
    StorageOperation,
    StorageError,

    // Security
    SecurityViolation,
    AuthenticationFailed,
    AuthorizationDenied,
    SuspiciousActivity,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::ClientConnected => "client_connected",
            EventType::ClientDisconnected => "client_disconnected",
            EventType::ClientAuthenticated => "client_authenticated",
            EventType::ClientAuthorized => "client_authorized",
            EventType::ClientRateLimited => "client_rate_limited",
            EventType::MessageSent => "message_sent",
            EventType::MessageReceived => "message_received",
            EventType::MessageRouted => "message_routed",
            EventType::MessageFailed => "message_failed",
            EventType::MessageHistoryRetrieved => "message_history_retrieved",
            EventType::RoomCreated => "room_created",
            EventType::RoomDeleted => "room_deleted",
            EventType::ChannelCreated => "channel_created",
            EventType::ChannelDeleted => "channel_deleted",
            EventType::ClientJoinedRoom => "client_joined_room",
            EventType::ClientLeftRoom => "client_left_room",
            EventType::ClientJoinedChannel => "client_joined_channel",
            EventType::ClientLeftChannel => "client_left_channel",
            EventType::CommandExecuted => "command_executed",
            EventType::CommandSucceeded => "command_succeeded",
            EventType::CommandFailed => "command_failed",
            EventType::CommandRateLimited => "command_rate_limited",
            EventType::SystemStarted => "system_started",
            EventType::SystemStopped => "system_stopped",
            EventType::SystemError => "system_error",
            EventType::SystemWarning => "system_warning",
            EventType::SystemInfo => "system_info",
            EventType::StorageOperation => "storage_operation",
            EventType::StorageError => "storage_error",
            EventType::SecurityViolation => "security_violation",
            EventType::AuthenticationFailed => "authentication_failed",
            EventType::AuthorizationDenied => "authorization_denied",
            EventType::SuspiciousActivity => "suspicious_activity",
        }
    }
}

/// A single telemetry event, ready to hand to subscribers or fan out
/// over the bus itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub client_id: Option<String>,
    pub message_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub severity: Severity,
    pub source: &'static str,
}

impl TelemetryEvent {
    pub fn new(event_type: EventType, severity: Severity) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            client_id: None,
            message_id: None,
            metadata: Map::new(),
            severity,
            source: "arqonbus",
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

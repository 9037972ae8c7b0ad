use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::ids;

pub const PROTOCOL_VERSION: &str = "1.0";

/// The set of envelope kinds ArqonBus understands on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Message,
    Command,
    Response,
    Error,
    Telemetry,
    #[serde(rename = "operator.join")]
    OperatorJoin,
}

impl EnvelopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeType::Message => "message",
            EnvelopeType::Command => "command",
            EnvelopeType::Response => "response",
            EnvelopeType::Error => "error",
            EnvelopeType::Telemetry => "telemetry",
            EnvelopeType::OperatorJoin => "operator.join",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
    Pending,
}

/// The universal ArqonBus message record.
///
/// Only fields relevant to the envelope's `type` are expected to be set;
/// the rest stay `None`/empty, matching the source's optional-field
/// `to_dict()` behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_client: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Envelope {
    /// Build a new envelope of `kind`, stamping a fresh id and the current
    /// timestamp. Callers set the remaining fields with the builder methods.
    pub fn build(kind: EnvelopeType) -> Self {
        Self {
            id: ids::generate_message_id(),
            timestamp: chrono::Utc::now(),
            kind,
            version: PROTOCOL_VERSION.to_string(),
            room: None,
            channel: None,
            sender: None,
            to_client: None,
            from_client: None,
            payload: Map::new(),
            command: None,
            args: Map::new(),
            request_id: None,
            status: None,
            error: None,
            error_code: None,
            metadata: Map::new(),
        }
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, args: Map<String, Value>) -> Self {
        self.command = Some(command.into());
        self.args = args;
        self
    }

    pub fn with_response(mut self, request_id: impl Into<String>, status: ResponseStatus) -> Self {
        self.request_id = Some(request_id.into());
        self.status = Some(status);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>, error_code: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.error_code = Some(error_code.into());
        self
    }

    /// Runs every validation rule from the component spec, collecting *all*
    /// violations rather than stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.id.is_empty() {
            errors.push("id must not be empty".to_string());
        } else if !ids::is_valid_message_id(&self.id) {
            errors.push(format!("id '{}' does not match the expected format", self.id));
        }

        if self.version != PROTOCOL_VERSION {
            errors.push(format!(
                "version must be '{}', got '{}'",
                PROTOCOL_VERSION, self.version
            ));
        }

        match self.kind {
            EnvelopeType::Message => {
                if self.payload.is_empty() {
                    errors.push("message envelope requires a non-empty payload".to_string());
                }
            }
            EnvelopeType::Command => {
                match &self.command {
                    Some(c) if !c.is_empty() => {}
                    _ => errors.push("command envelope requires a non-empty command name".to_string()),
                }
            }
            EnvelopeType::Response => {
                if self.request_id.is_none() {
                    errors.push("response envelope requires request_id".to_string());
                }
                match self.status {
                    None => errors.push("response envelope requires status".to_string()),
                    Some(status) if status != ResponseStatus::Success && self.error_code.is_none() => {
                        errors.push(
                            "response with status != success requires an error_code".to_string(),
                        );
                    }
                    _ => {}
                }
            }
            EnvelopeType::Error | EnvelopeType::Telemetry | EnvelopeType::OperatorJoin => {}
        }

        errors
    }

    /// Validate and reject with the full list of violations on failure.
    pub fn build_validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(Error::Validation(errors))
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_binary(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::Binary)
    }

    pub fn from_binary(raw: &[u8]) -> Result<Self> {
        bincode::deserialize(raw).map_err(Error::Binary)
    }
}

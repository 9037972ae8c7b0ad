use serde_json::{Map, Value};

use crate::envelope::{Envelope, EnvelopeType, ResponseStatus};

/// Builds the `message` envelope sent to a freshly registered client:
/// `{welcome: "...", client_id}`.
pub fn welcome(client_id: &str) -> Envelope {
    let mut payload = Map::new();
    payload.insert(
        "welcome".to_string(),
        Value::String("connected to arqonbus".to_string()),
    );
    payload.insert("client_id".to_string(), Value::String(client_id.to_string()));
    Envelope::build(EnvelopeType::Message).with_payload(payload)
}

/// Builds the `message_response` ack envelope sent back to the sender of an
/// accepted `message`.
pub fn message_response(original: &Envelope) -> Envelope {
    let mut payload = Map::new();
    payload.insert("acked_id".to_string(), Value::String(original.id.clone()));
    Envelope::build(EnvelopeType::Response)
        .with_response(original.id.clone(), ResponseStatus::Success)
        .with_payload(payload)
}

/// Builds a terminal `response` envelope carrying a command's result.
pub fn command_response(request_id: &str, result: Value) -> Envelope {
    let mut payload = Map::new();
    if let Value::Object(map) = result {
        payload = map;
    } else {
        payload.insert("result".to_string(), result);
    }
    Envelope::build(EnvelopeType::Response)
        .with_response(request_id.to_string(), ResponseStatus::Success)
        .with_payload(payload)
}

/// Builds an `error` envelope: `{type: error, request_id, error_code, error, payload}`.
pub fn error_reply(request_id: Option<&str>, error_code: &str, message: &str) -> Envelope {
    let mut env = Envelope::build(EnvelopeType::Error).with_error(message, error_code);
    if let Some(rid) = request_id {
        env.request_id = Some(rid.to_string());
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn welcome_carries_client_id() {
        let env = welcome("arq_client_abc");
        assert_eq!(
            env.payload.get("client_id").and_then(Value::as_str),
            Some("arq_client_abc")
        );
    }

    #[test]
    fn error_reply_carries_code_and_request_id() {
        let env = error_reply(Some("req-1"), crate::error_codes::VALIDATION_ERROR, "bad envelope");
        assert_eq!(env.error_code.as_deref(), Some(crate::error_codes::VALIDATION_ERROR));
        assert_eq!(env.request_id.as_deref(), Some("req-1"));
    }
}

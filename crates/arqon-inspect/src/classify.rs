use arqon_protocol::{Envelope, EnvelopeType};
use regex::Regex;
use std::sync::OnceLock;

use crate::outcome::CASILClassification;

fn secret_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)api[_-]?key",
            r"(?i)secret",
            r"(?i)token",
            r"(?i)password",
            r"(?i)bearer\s+[a-zA-Z0-9._-]+",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Serializes the envelope payload and truncates it to `max_bytes`, mirroring
/// the source's `_flatten_payload`.
pub fn flatten_payload(envelope: &Envelope, max_bytes: usize) -> String {
    let serialized = serde_json::to_string(&envelope.payload).unwrap_or_default();
    if serialized.len() > max_bytes {
        serialized.chars().take(max_bytes).collect()
    } else {
        serialized
    }
}

fn detect_secret(text: &str) -> bool {
    secret_patterns().iter().any(|re| re.is_match(text))
}

/// Assigns a coarse kind and risk level to an envelope, ahead of policy
/// evaluation. `oversize_payload` and `mode` feed context the classifier
/// alone can't derive from the envelope.
pub fn classify(envelope: &Envelope, max_inspect_bytes: usize, oversize_payload: bool, mode: &str) -> CASILClassification {
    let kind = match envelope.kind {
        EnvelopeType::Command | EnvelopeType::OperatorJoin => "control",
        EnvelopeType::Telemetry => "telemetry",
        EnvelopeType::Message => "data",
        EnvelopeType::Error => "system",
        EnvelopeType::Response => "unknown",
    }
    .to_string();

    let flattened = flatten_payload(envelope, max_inspect_bytes);
    let contains_probable_secret = detect_secret(&flattened);

    let mut risk_level = "low".to_string();
    if contains_probable_secret {
        risk_level = "high".to_string();
    } else if oversize_payload && risk_level == "low" {
        risk_level = "medium".to_string();
    }

    if mode == "enforce" && contains_probable_secret {
        risk_level = "high".to_string();
    }

    CASILClassification { kind, risk_level, contains_probable_secret }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    #[test]
    fn command_envelope_classifies_as_control() {
        let env = Envelope::build(EnvelopeType::Command).with_command("ping", Default::default());
        let c = classify(&env, 65536, false, "monitor");
        assert_eq!(c.kind, "control");
        assert_eq!(c.risk_level, "low");
    }

    #[test]
    fn payload_containing_token_flags_high_risk() {
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"api_token": "abc123"}).as_object().unwrap().clone());
        let c = classify(&env, 65536, false, "monitor");
        assert!(c.contains_probable_secret);
        assert_eq!(c.risk_level, "high");
    }

    #[test]
    fn oversize_payload_escalates_to_medium_when_clean() {
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"data": "hello"}).as_object().unwrap().clone());
        let c = classify(&env, 65536, true, "monitor");
        assert_eq!(c.risk_level, "medium");
    }
}

use arqon_config::CasilConfig;
use arqon_protocol::Envelope;

use crate::classify::flatten_payload;
use crate::error::{
    CASIL_POLICY_ALLOWED, CASIL_POLICY_BLOCKED_SECRET, CASIL_POLICY_OVERSIZE, CASIL_POLICY_REDACTED,
};
use crate::outcome::CASILClassification;

pub struct PolicyContext {
    pub oversize_payload: bool,
}

pub struct PolicyResult {
    pub should_block: bool,
    pub should_redact: bool,
    pub reason_code: String,
    pub flags: Vec<String>,
}

fn detect_probable_secret(envelope: &Envelope, max_inspect_bytes: usize) -> bool {
    let flattened = flatten_payload(envelope, max_inspect_bytes);
    crate::classify::classify(envelope, max_inspect_bytes, false, "monitor").contains_probable_secret
        || flattened.to_lowercase().contains("secret")
}

/// Applies oversize and probable-secret policy checks, in that order, so a
/// later secret match can upgrade an earlier oversize-only block reason.
pub fn evaluate_policies(
    envelope: &Envelope,
    classification: &CASILClassification,
    config: &CasilConfig,
    context: &PolicyContext,
) -> PolicyResult {
    let mut should_block = false;
    let mut should_redact = false;
    let mut reason_code = CASIL_POLICY_ALLOWED.to_string();
    let mut flags = Vec::new();

    let payload_len = serde_json::to_string(&envelope.payload).map(|s| s.len()).unwrap_or(0);
    if payload_len > config.max_payload_bytes {
        should_block = true;
        reason_code = CASIL_POLICY_OVERSIZE.to_string();
        flags.push("oversize_payload".to_string());
    }
    if context.oversize_payload && !flags.contains(&"oversize_payload".to_string()) {
        flags.push("oversize_payload".to_string());
    }

    let rescan_for_secret = config.block_on_probable_secret || config.mode == "enforce";
    let probable_secret = classification.contains_probable_secret
        || (rescan_for_secret && detect_probable_secret(envelope, config.max_inspect_bytes));

    if probable_secret {
        flags.push("probable_secret".to_string());
        if config.block_on_probable_secret || config.mode == "enforce" {
            should_redact = true;
            if config.block_on_probable_secret {
                should_block = true;
                reason_code = CASIL_POLICY_BLOCKED_SECRET.to_string();
            }
        }
    }

    if !should_block && should_redact {
        reason_code = CASIL_POLICY_REDACTED.to_string();
    } else if !should_block {
        reason_code = CASIL_POLICY_ALLOWED.to_string();
    }

    PolicyResult { should_block, should_redact, reason_code, flags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_config::CasilConfig;
    use arqon_protocol::EnvelopeType;

    #[test]
    fn oversize_payload_blocks_with_oversize_reason() {
        let mut config = CasilConfig::default();
        config.max_payload_bytes = 1;
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"data": "a lot of content here"}).as_object().unwrap().clone());
        let classification = crate::classify::classify(&env, config.max_inspect_bytes, false, &config.mode);
        let result = evaluate_policies(&env, &classification, &config, &PolicyContext { oversize_payload: true });
        assert!(result.should_block);
        assert_eq!(result.reason_code, CASIL_POLICY_OVERSIZE);
    }

    #[test]
    fn probable_secret_with_block_on_secret_blocks() {
        let mut config = CasilConfig::default();
        config.block_on_probable_secret = true;
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"api_token": "xyz"}).as_object().unwrap().clone());
        let classification = crate::classify::classify(&env, config.max_inspect_bytes, false, &config.mode);
        let result = evaluate_policies(&env, &classification, &config, &PolicyContext { oversize_payload: false });
        assert!(result.should_block);
        assert_eq!(result.reason_code, CASIL_POLICY_BLOCKED_SECRET);
    }

    #[test]
    fn probable_secret_without_block_flag_only_redacts() {
        let config = CasilConfig { mode: "enforce".to_string(), ..CasilConfig::default() };
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"api_token": "xyz"}).as_object().unwrap().clone());
        let classification = crate::classify::classify(&env, config.max_inspect_bytes, false, &config.mode);
        let result = evaluate_policies(&env, &classification, &config, &PolicyContext { oversize_payload: false });
        assert!(!result.should_block);
        assert!(result.should_redact);
        assert_eq!(result.reason_code, CASIL_POLICY_REDACTED);
    }

    #[test]
    fn clean_payload_is_allowed() {
        let config = CasilConfig::default();
        let env = Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"data": "hello"}).as_object().unwrap().clone());
        let classification = crate::classify::classify(&env, config.max_inspect_bytes, false, &config.mode);
        let result = evaluate_policies(&env, &classification, &config, &PolicyContext { oversize_payload: false });
        assert!(!result.should_block);
        assert!(!result.should_redact);
        assert_eq!(result.reason_code, CASIL_POLICY_ALLOWED);
    }
}

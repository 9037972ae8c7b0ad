use std::panic::{self, AssertUnwindSafe};

use arqon_config::CasilConfig;
use arqon_protocol::Envelope;
use tracing::{error, warn};

use crate::classify::classify;
use crate::error::{CASIL_DISABLED, CASIL_INTERNAL_ERROR, CASIL_MONITOR_MODE, CASIL_OUT_OF_SCOPE};
use crate::outcome::{CASILDecision, CASILOutcome};
use crate::policy::{evaluate_policies, PolicyContext};
use crate::redact::redact_payload;
use crate::scope::in_scope;

/// Content-aware inspection gate. Runs every in-scope envelope through
/// scope matching, classification, policy evaluation and redaction, and
/// never lets an internal failure block traffic it wasn't configured to
/// block: any panic in the pipeline falls back to `config.default_decision`.
///
/// This intentionally does not include a fast-path to an external safety
/// classifier; every envelope that reaches this gate runs the full
/// classify/policy/redact pipeline below.
pub struct CASILEngine;

impl CASILEngine {
    pub fn inspect(envelope: &Envelope, config: &CasilConfig) -> CASILOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| Self::inspect_inner(envelope, config))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("CASIL inspection panicked, falling back to default decision");
                Self::fallback(config)
            }
        }
    }

    fn fallback(config: &CasilConfig) -> CASILOutcome {
        if config.default_decision == "block" {
            CASILOutcome::block(CASIL_INTERNAL_ERROR, Vec::new())
        } else {
            CASILOutcome::allow(CASIL_INTERNAL_ERROR)
        }
    }

    fn inspect_inner(envelope: &Envelope, config: &CasilConfig) -> CASILOutcome {
        if !config.enabled {
            return CASILOutcome::allow(CASIL_DISABLED);
        }

        let room = envelope.room.as_deref();
        let channel = envelope.channel.as_deref();
        if !in_scope(&config.scope, room, channel, config.enabled) {
            return CASILOutcome::allow(CASIL_OUT_OF_SCOPE);
        }
        let room_channel = match (room, channel) {
            (Some(r), Some(c)) => format!("{r}:{c}"),
            (Some(r), None) => r.to_string(),
            (None, Some(c)) => c.to_string(),
            (None, None) => String::new(),
        };

        let payload_len = serde_json::to_string(&envelope.payload).map(|s| s.len()).unwrap_or(0);
        let oversize_payload = payload_len > config.max_inspect_bytes;

        let classification = classify(envelope, config.max_inspect_bytes, oversize_payload, &config.mode);
        let policy_result = evaluate_policies(
            envelope,
            &classification,
            config,
            &PolicyContext { oversize_payload },
        );

        let redaction_configured = !config.redaction.paths.is_empty()
            || !config.redaction.patterns.is_empty()
            || !config.redaction.never_log_for.is_empty();
        let redaction_needed = policy_result.should_redact || redaction_configured;

        let redacted_payload = if redaction_needed {
            Some(redact_payload(
                &envelope.payload,
                &config.redaction,
                &room_channel,
                "logs",
                config.max_patterns,
            ))
        } else {
            None
        };

        let mut outcome = if policy_result.should_block && config.mode == "enforce" {
            CASILOutcome {
                decision: CASILDecision::Block,
                reason_code: policy_result.reason_code.clone(),
                flags: policy_result.flags.clone(),
                redacted_payload: redacted_payload.clone(),
                transport_payload: None,
            }
        } else if redaction_needed {
            CASILOutcome::allow_with_redaction(
                policy_result.reason_code.clone(),
                policy_result.flags.clone(),
                redacted_payload.clone().unwrap_or_default(),
            )
        } else {
            CASILOutcome::allow(policy_result.reason_code.clone())
        };

        if config.mode == "monitor" && outcome.decision == CASILDecision::Block {
            warn!(room_channel = %room_channel, reason = %outcome.reason_code, "CASIL monitor mode downgrading block");
            outcome = if policy_result.should_redact {
                CASILOutcome::allow_with_redaction(
                    CASIL_MONITOR_MODE,
                    policy_result.flags.clone(),
                    redacted_payload.unwrap_or_default(),
                )
            } else {
                CASILOutcome::allow(CASIL_MONITOR_MODE)
            };
        }

        if outcome.decision == CASILDecision::AllowWithRedaction && config.redaction.transport_redaction {
            outcome.transport_payload = Some(redact_payload(
                &envelope.payload,
                &config.redaction,
                &room_channel,
                "transport",
                config.max_patterns,
            ));
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_config::{CasilConfig, CasilScopeConfig};
    use arqon_protocol::EnvelopeType;

    fn enforce_config() -> CasilConfig {
        CasilConfig {
            enabled: true,
            mode: "enforce".to_string(),
            block_on_probable_secret: true,
            scope: CasilScopeConfig::default(),
            ..CasilConfig::default()
        }
    }

    #[test]
    fn disabled_gate_allows_everything() {
        let config = CasilConfig::default();
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"secret": "x"}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        assert_eq!(outcome.decision, CASILDecision::Allow);
        assert_eq!(outcome.reason_code, CASIL_DISABLED);
    }

    #[test]
    fn out_of_scope_envelope_is_allowed() {
        let config = CasilConfig {
            enabled: true,
            scope: CasilScopeConfig { include: vec!["other:*".to_string()], exclude: Vec::new() },
            ..CasilConfig::default()
        };
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"x": 1}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        assert_eq!(outcome.reason_code, CASIL_OUT_OF_SCOPE);
    }

    #[test]
    fn enforce_mode_blocks_probable_secret() {
        let config = enforce_config();
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"api_token": "abc123"}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        assert!(outcome.is_blocked());
    }

    #[test]
    fn monitor_mode_downgrades_block_to_redaction() {
        let mut config = enforce_config();
        config.mode = "monitor".to_string();
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"api_token": "abc123"}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        assert!(!outcome.is_blocked());
        assert_eq!(outcome.reason_code, CASIL_MONITOR_MODE);
        assert!(outcome.redacted_payload.is_some());
    }

    #[test]
    fn default_decision_allow_is_used_when_config_has_no_default() {
        let config = CasilConfig::default();
        let outcome = CASILEngine::fallback(&config);
        assert_eq!(outcome.decision, CASILDecision::Allow);
    }

    #[test]
    fn transport_payload_is_absent_without_transport_redaction() {
        let config = CasilConfig {
            enabled: true,
            mode: "monitor".to_string(),
            redaction: arqon_config::CasilRedactionConfig {
                paths: vec!["secret".to_string()],
                ..arqon_config::CasilRedactionConfig::default()
            },
            ..CasilConfig::default()
        };
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"secret": "x"}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        assert!(outcome.redacted_payload.is_some());
        assert!(outcome.transport_payload.is_none());
    }

    #[test]
    fn transport_payload_is_set_when_transport_redaction_enabled() {
        let config = CasilConfig {
            enabled: true,
            mode: "monitor".to_string(),
            redaction: arqon_config::CasilRedactionConfig {
                paths: vec!["secret".to_string()],
                transport_redaction: true,
                ..arqon_config::CasilRedactionConfig::default()
            },
            ..CasilConfig::default()
        };
        let env = Envelope::build(EnvelopeType::Message)
            .with_room("science")
            .with_channel("general")
            .with_payload(serde_json::json!({"secret": "x"}).as_object().unwrap().clone());
        let outcome = CASILEngine::inspect(&env, &config);
        let transport = outcome.transport_payload.expect("transport redaction should be set");
        assert_eq!(transport.get("secret").unwrap(), crate::redact::REDACT_TOKEN);
    }
}

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CASILDecision {
    Allow,
    AllowWithRedaction,
    Block,
}

impl CASILDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            CASILDecision::Allow => "allow",
            CASILDecision::AllowWithRedaction => "allow_with_redaction",
            CASILDecision::Block => "block",
        }
    }
}

/// Coarse kind + risk assigned to an envelope before policy evaluation runs.
#[derive(Debug, Clone)]
pub struct CASILClassification {
    pub kind: String,
    pub risk_level: String,
    pub contains_probable_secret: bool,
}

/// The result of running an envelope through the inspection pipeline.
#[derive(Debug, Clone)]
pub struct CASILOutcome {
    pub decision: CASILDecision,
    pub reason_code: String,
    pub flags: Vec<String>,
    /// Redaction of the payload for the logging/telemetry target. Never the
    /// body a live subscriber should see — see `transport_payload`.
    pub redacted_payload: Option<Map<String, Value>>,
    /// The body to forward to live subscribers in place of the original,
    /// set only when redaction applies *and* `redaction.transport_redaction`
    /// is enabled. `None` means route the original payload untouched.
    pub transport_payload: Option<Map<String, Value>>,
}

impl CASILOutcome {
    pub fn allow(reason_code: impl Into<String>) -> Self {
        Self {
            decision: CASILDecision::Allow,
            reason_code: reason_code.into(),
            flags: Vec::new(),
            redacted_payload: None,
            transport_payload: None,
        }
    }

    pub fn block(reason_code: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            decision: CASILDecision::Block,
            reason_code: reason_code.into(),
            flags,
            redacted_payload: None,
            transport_payload: None,
        }
    }

    pub fn allow_with_redaction(
        reason_code: impl Into<String>,
        flags: Vec<String>,
        redacted_payload: Map<String, Value>,
    ) -> Self {
        Self {
            decision: CASILDecision::AllowWithRedaction,
            reason_code: reason_code.into(),
            flags,
            redacted_payload: Some(redacted_payload),
            transport_payload: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.decision == CASILDecision::Block
    }
}

//! Hot-reloadable wrapper around [`arqon_inspect::CASILEngine`].
//!
//! `CASILEngine::inspect` is a pure function of `(envelope, &CasilConfig)`;
//! it has no notion of a live, swappable configuration. [`CasilGate`] owns
//! that mutable cell so `op.casil.reload` can swap the whole config in one
//! write without touching inspections already in flight.

use std::time::Instant;

use arqon_config::CasilConfig;
use arqon_inspect::{CASILEngine, CASILOutcome};
use arqon_protocol::Envelope;
use tokio::sync::RwLock;

pub struct CasilGate {
    config: RwLock<CasilConfig>,
}

impl CasilGate {
    pub fn new(config: CasilConfig) -> Self {
        Self { config: RwLock::new(config) }
    }

    /// Inspects `envelope` against the config snapshot current at call time.
    pub async fn inspect(&self, envelope: &Envelope) -> CASILOutcome {
        let config = self.config.read().await.clone();
        let started = Instant::now();
        let outcome = CASILEngine::inspect(envelope, &config);
        arqon_metrics::histogram!(arqon_metrics::casil::INSPECTION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        arqon_metrics::counter!(arqon_metrics::casil::INSPECTIONS_TOTAL).increment(1);
        if outcome.is_blocked() {
            arqon_metrics::counter!(arqon_metrics::casil::BLOCKED_TOTAL).increment(1);
        } else if outcome.redacted_payload.is_some() {
            arqon_metrics::counter!(arqon_metrics::casil::REDACTED_TOTAL).increment(1);
        }
        outcome
    }

    /// Replaces the live config wholesale. Returns the mode string now in effect.
    pub async fn reload(&self, new_config: CasilConfig) -> String {
        let mode = new_config.mode.clone();
        *self.config.write().await = new_config;
        mode
    }

    pub async fn current_mode(&self) -> String {
        self.config.read().await.mode.clone()
    }

    /// Snapshot of the whole live config, used by `op.casil.reload` to
    /// apply a partial update on top of whatever is currently active.
    pub async fn current_config(&self) -> CasilConfig {
        self.config.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arqon_protocol::EnvelopeType;

    fn msg_envelope() -> Envelope {
        Envelope::build(EnvelopeType::Message)
            .with_payload(serde_json::json!({"content": "hello"}).as_object().unwrap().clone())
    }

    #[tokio::test]
    async fn disabled_by_default_allows() {
        let gate = CasilGate::new(CasilConfig::default());
        let outcome = gate.inspect(&msg_envelope()).await;
        assert!(!outcome.is_blocked());
    }

    #[tokio::test]
    async fn reload_swaps_mode() {
        let gate = CasilGate::new(CasilConfig::default());
        assert_eq!(gate.current_mode().await, "monitor");
        let mut enforced = CasilConfig::default();
        enforced.mode = "enforce".to_string();
        let mode = gate.reload(enforced).await;
        assert_eq!(mode, "enforce");
        assert_eq!(gate.current_mode().await, "enforce");
    }
}

use crate::schema::{ArqonBusConfig, StorageMode};

/// Field-level validation, independent of environment/preflight strictness.
/// Collects every violation rather than stopping at the first.
pub fn validate(cfg: &ArqonBusConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if cfg.server.port == 0 {
        errors.push("invalid server port: 0".to_string());
    }
    if cfg.server.max_connections < 1 {
        errors.push(format!("invalid max connections: {}", cfg.server.max_connections));
    }
    if cfg.websocket.max_message_size < 1024 {
        errors.push(format!("message size too small: {}", cfg.websocket.max_message_size));
    }
    if cfg.storage.backend.is_none() {
        errors.push("storage backend must be set".to_string());
    }
    if cfg.storage.max_history_size < 1 {
        errors.push(format!("invalid history size: {}", cfg.storage.max_history_size));
    }
    if cfg.security.rate_limit_per_minute < 1 {
        errors.push(format!("invalid rate limit: {}", cfg.security.rate_limit_per_minute));
    }
    if cfg.security.enable_authentication && cfg.security.shared_secret.is_none() {
        errors.push("shared secret is required when authentication is enabled".to_string());
    }
    if !matches!(cfg.casil.mode.as_str(), "monitor" | "enforce") {
        errors.push(format!("invalid CASIL mode: {}", cfg.casil.mode));
    }
    if !matches!(cfg.casil.default_decision.as_str(), "allow" | "block") {
        errors.push(format!("invalid CASIL default_decision: {}", cfg.casil.default_decision));
    }
    if cfg.telemetry.metrics_interval_secs < 1.0 {
        errors.push(format!(
            "invalid metrics interval: {}",
            cfg.telemetry.metrics_interval_secs
        ));
    }
    if cfg.storage.mode == StorageMode::Strict && cfg.storage.backend.is_none() {
        errors.push("strict storage mode requires a concrete backend".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StorageBackend;

    #[test]
    fn default_config_requires_a_storage_backend() {
        let cfg = ArqonBusConfig::default();
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("storage backend")));
    }

    #[test]
    fn auth_enabled_without_secret_is_rejected() {
        let mut cfg = ArqonBusConfig::default();
        cfg.storage.backend = Some(StorageBackend::Memory);
        cfg.security.enable_authentication = true;
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("shared secret")));
    }

    #[test]
    fn well_formed_config_passes() {
        let mut cfg = ArqonBusConfig::default();
        cfg.storage.backend = Some(StorageBackend::Memory);
        assert!(validate(&cfg).is_empty());
    }
}

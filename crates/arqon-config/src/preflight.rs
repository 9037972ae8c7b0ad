use std::env;

use crate::schema::{ArqonBusConfig, StorageBackend, StorageMode};

/// Startup gating beyond field-level [`validate`](crate::validate::validate).
///
/// Strict when `ARQONBUS_PREFLIGHT_STRICT=true` or the environment is
/// staging/prod. Returns every violation found (never just the first).
pub fn preflight_errors(cfg: &ArqonBusConfig) -> Vec<String> {
    let mut errors = Vec::new();

    let strict = env::var("ARQONBUS_PREFLIGHT_STRICT")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
        || cfg.environment.is_staging_or_prod();

    if !strict {
        return errors;
    }

    for var_name in ["ARQONBUS_SERVER_HOST", "ARQONBUS_SERVER_PORT", "ARQONBUS_STORAGE_MODE"] {
        if env::var(var_name).is_err() {
            errors.push(format!(
                "missing required environment variable in strict preflight: {var_name}"
            ));
        }
    }

    if cfg.storage.mode == StorageMode::Strict {
        match cfg.storage.backend {
            Some(StorageBackend::LogStream) => {
                if cfg.storage.log_stream_url.is_none() {
                    errors.push(
                        "storage mode 'strict' with a log-stream backend requires ARQONBUS_REDIS_URL or ARQONBUS_VALKEY_URL".to_string(),
                    );
                }
            }
            Some(StorageBackend::Sql) => {
                if cfg.storage.sql_url.is_none() {
                    errors.push(
                        "storage mode 'strict' with a SQL backend requires ARQONBUS_SQL_URL".to_string(),
                    );
                }
            }
            _ => errors.push(
                "storage mode 'strict' requires a log-stream or SQL backend".to_string(),
            ),
        }
    }

    let require_dual_data_stack = match env::var("ARQONBUS_REQUIRE_DUAL_DATA_STACK") {
        Ok(raw) => raw.eq_ignore_ascii_case("true"),
        Err(_) => cfg.environment.as_str() == "prod",
    };

    if require_dual_data_stack {
        if cfg.storage.log_stream_url.is_none() {
            errors.push(
                "dual data stack requires ARQONBUS_VALKEY_URL (or ARQONBUS_REDIS_URL) for shared hot-state".to_string(),
            );
        }
        if cfg.storage.sql_url.is_none() {
            errors.push("dual data stack requires ARQONBUS_SQL_URL for durable shared state".to_string());
        }
    }

    if cfg.environment.as_str() == "prod" && cfg.debug {
        errors.push("debug mode is forbidden in production preflight".to_string());
    }

    if cfg.environment.is_staging_or_prod() && cfg.websocket.wire_json_allowed {
        errors.push("ARQONBUS_ALLOW_JSON_WIRE must be false in staging/prod".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;

    #[test]
    fn prod_without_dual_data_stack_fails() {
        let mut cfg = ArqonBusConfig::default();
        cfg.environment = Environment::Prod;
        cfg.storage.mode = StorageMode::Strict;
        cfg.storage.backend = Some(StorageBackend::LogStream);
        let errors = preflight_errors(&cfg);
        assert!(errors.iter().any(|e| e.contains("dual data stack") || e.contains("log-stream")));
    }

    #[test]
    fn dev_without_overrides_is_unconstrained() {
        let cfg = ArqonBusConfig::default();
        let errors = preflight_errors(&cfg);
        assert!(errors.is_empty());
    }
}

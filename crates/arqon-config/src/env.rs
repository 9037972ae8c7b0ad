use std::env;

use crate::environment::{self, Environment};
use crate::error::Result;
use crate::schema::*;

fn var(name: &str) -> Option<String> {
    env::var(name).ok()
}

fn var_bool(name: &str, default: bool) -> bool {
    var(name)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn var_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn var_list(name: &str) -> Option<Vec<String>> {
    var(name).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn env_first(names: &[&str]) -> Option<String> {
    names.iter().find_map(|n| var(n))
}

fn normalize_backend(raw: &str) -> Option<StorageBackend> {
    match raw.trim().to_lowercase().as_str() {
        "memory" | "memory_storage" => Some(StorageBackend::Memory),
        "redis" | "redis_streams" | "valkey" | "valkey_streams" | "log_stream" => {
            Some(StorageBackend::LogStream)
        }
        "postgres" | "postgresql" | "sql" | "sqlite" => Some(StorageBackend::Sql),
        _ => None,
    }
}

/// Load configuration from `ARQONBUS_`-prefixed environment variables,
/// falling back to documented defaults for anything unset.
pub fn from_environment() -> Result<ArqonBusConfig> {
    let mut cfg = ArqonBusConfig::default();

    cfg.environment = environment::normalize(
        &var("ARQONBUS_ENVIRONMENT").unwrap_or_else(|| cfg.environment.as_str().to_string()),
    )?;
    cfg.debug = var_bool("ARQONBUS_DEBUG", false);

    cfg.server.host = var("ARQONBUS_SERVER_HOST").unwrap_or(cfg.server.host);
    cfg.server.port = var_parsed("ARQONBUS_SERVER_PORT", cfg.server.port);
    cfg.server.max_connections = var_parsed("ARQONBUS_MAX_CONNECTIONS", cfg.server.max_connections);
    cfg.server.connection_timeout_secs =
        var_parsed("ARQONBUS_CONNECTION_TIMEOUT", cfg.server.connection_timeout_secs);

    cfg.websocket.max_message_size =
        var_parsed("ARQONBUS_MAX_MESSAGE_SIZE", cfg.websocket.max_message_size);
    cfg.websocket.wire_json_allowed = match var("ARQONBUS_ALLOW_JSON_WIRE") {
        Some(raw) => raw.trim().eq_ignore_ascii_case("true"),
        None => !cfg.environment.is_staging_or_prod(),
    };

    if let Some(raw) = var("ARQONBUS_STORAGE_BACKEND") {
        cfg.storage.backend = normalize_backend(&raw);
    }
    cfg.storage.mode = match var("ARQONBUS_STORAGE_MODE").as_deref() {
        Some("strict") => StorageMode::Strict,
        Some("degraded") | None => StorageMode::Degraded,
        Some(_) => StorageMode::Degraded,
    };
    cfg.storage.log_stream_url =
        env_first(&["ARQONBUS_VALKEY_URL", "ARQONBUS_REDIS_URL"]).or(cfg.storage.log_stream_url);
    cfg.storage.sql_url = var("ARQONBUS_SQL_URL").or(cfg.storage.sql_url);
    cfg.storage.max_history_size =
        var_parsed("ARQONBUS_MAX_HISTORY_SIZE", 10_000);

    cfg.security.enable_authentication = var_bool("ARQONBUS_ENABLE_AUTH", false);
    cfg.security.shared_secret = var("ARQONBUS_AUTH_SHARED_SECRET");
    cfg.security.rate_limit_per_minute =
        var_parsed("ARQONBUS_RATE_LIMIT_PER_MINUTE", cfg.security.rate_limit_per_minute);

    cfg.operator.auth_required = var_bool("ARQONBUS_OPERATOR_AUTH_REQUIRED", false);
    cfg.operator.auth_token = var("ARQONBUS_OPERATOR_AUTH_TOKEN");

    cfg.casil.enabled = var_bool("ARQONBUS_CASIL_ENABLED", cfg.casil.enabled);
    cfg.casil.mode = var("ARQONBUS_CASIL_MODE").unwrap_or(cfg.casil.mode);
    cfg.casil.default_decision =
        var("ARQONBUS_CASIL_DEFAULT_DECISION").unwrap_or(cfg.casil.default_decision);
    if let Some(list) = var_list("ARQONBUS_CASIL_SCOPE_INCLUDE") {
        cfg.casil.scope.include = list;
    }
    if let Some(list) = var_list("ARQONBUS_CASIL_SCOPE_EXCLUDE") {
        cfg.casil.scope.exclude = list;
    }
    cfg.casil.max_inspect_bytes =
        var_parsed("ARQONBUS_CASIL_MAX_INSPECT_BYTES", cfg.casil.max_inspect_bytes);
    cfg.casil.max_patterns = var_parsed("ARQONBUS_CASIL_MAX_PATTERNS", cfg.casil.max_patterns);
    cfg.casil.max_payload_bytes =
        var_parsed("ARQONBUS_CASIL_MAX_PAYLOAD_BYTES", cfg.casil.max_payload_bytes);
    cfg.casil.block_on_probable_secret =
        var_bool("ARQONBUS_CASIL_BLOCK_ON_PROBABLE_SECRET", cfg.casil.block_on_probable_secret);
    if let Some(list) = var_list("ARQONBUS_CASIL_REDACTION_PATHS") {
        cfg.casil.redaction.paths = list;
    }
    if let Some(list) = var_list("ARQONBUS_CASIL_REDACTION_PATTERNS") {
        cfg.casil.redaction.patterns = list;
    }
    cfg.casil.redaction.transport_redaction = var_bool(
        "ARQONBUS_CASIL_TRANSPORT_REDACTION",
        cfg.casil.redaction.transport_redaction,
    );
    if let Some(list) = var_list("ARQONBUS_CASIL_NEVER_LOG_PAYLOAD_FOR") {
        cfg.casil.redaction.never_log_for = list;
    }

    cfg.telemetry.enabled = var_bool("ARQONBUS_ENABLE_TELEMETRY", cfg.telemetry.enabled);
    cfg.telemetry.telemetry_room =
        var("ARQONBUS_TELEMETRY_ROOM").unwrap_or(cfg.telemetry.telemetry_room);
    cfg.telemetry.metrics_interval_secs =
        var_parsed("ARQONBUS_METRICS_INTERVAL", cfg.telemetry.metrics_interval_secs);

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variable tests run serially via a crate-level mutex in the
    // wider test suite; here each test only reads variables it itself sets
    // and removes, avoiding cross-test interference in the common case.

    #[test]
    fn backend_alias_normalization() {
        assert_eq!(normalize_backend("redis_streams"), Some(StorageBackend::LogStream));
        assert_eq!(normalize_backend("postgresql"), Some(StorageBackend::Sql));
        assert_eq!(normalize_backend("bogus"), None);
    }

    #[test]
    fn defaults_are_dev_profile() {
        let cfg = ArqonBusConfig::default();
        assert_eq!(cfg.environment.as_str(), "dev");
        assert!(cfg.websocket.wire_json_allowed);
    }
}

use crate::environment::Environment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    LogStream,
    Sql,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Degraded,
    Strict,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub connection_timeout_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9100,
            max_connections: 1000,
            connection_timeout_secs: 30.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    pub max_message_size: usize,
    pub wire_json_allowed: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024,
            wire_json_allowed: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub backend: Option<StorageBackend>,
    pub mode: StorageMode,
    pub log_stream_url: Option<String>,
    pub sql_url: Option<String>,
    pub max_history_size: usize,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Degraded
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub enable_authentication: bool,
    pub shared_secret: Option<String>,
    pub rate_limit_per_minute: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_authentication: false,
            shared_secret: None,
            rate_limit_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperatorConfig {
    pub auth_required: bool,
    pub auth_token: Option<String>,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self { auth_required: false, auth_token: None }
    }
}

#[derive(Debug, Clone)]
pub struct CasilRedactionConfig {
    pub paths: Vec<String>,
    pub patterns: Vec<String>,
    pub transport_redaction: bool,
    pub never_log_for: Vec<String>,
}

impl Default for CasilRedactionConfig {
    fn default() -> Self {
        Self {
            paths: vec!["password".into(), "token".into(), "secret".into()],
            patterns: Vec::new(),
            transport_redaction: false,
            never_log_for: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CasilScopeConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CasilConfig {
    pub enabled: bool,
    pub mode: String, // monitor|enforce
    pub default_decision: String, // allow|block
    pub scope: CasilScopeConfig,
    pub max_inspect_bytes: usize,
    pub max_patterns: usize,
    pub max_payload_bytes: usize,
    pub block_on_probable_secret: bool,
    pub redaction: CasilRedactionConfig,
}

impl Default for CasilConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "monitor".to_string(),
            default_decision: "allow".to_string(),
            scope: CasilScopeConfig::default(),
            max_inspect_bytes: 65536,
            max_patterns: 32,
            max_payload_bytes: 262144,
            block_on_probable_secret: false,
            redaction: CasilRedactionConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub telemetry_room: String,
    pub metrics_interval_secs: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            telemetry_room: "arqonbus.telemetry".to_string(),
            metrics_interval_secs: 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArqonBusConfig {
    pub environment: Environment,
    pub debug: bool,
    pub server: ServerConfig,
    pub websocket: WebSocketConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub operator: OperatorConfig,
    pub casil: CasilConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for ArqonBusConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            debug: false,
            server: ServerConfig::default(),
            websocket: WebSocketConfig::default(),
            storage: StorageConfig::default(),
            security: SecurityConfig::default(),
            operator: OperatorConfig::default(),
            casil: CasilConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

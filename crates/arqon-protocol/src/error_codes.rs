//! Opaque, stable error code strings carried on `error` envelopes.

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const AUTHORIZATION_ERROR: &str = "AUTHORIZATION_ERROR";
pub const MISSING_COMMAND: &str = "MISSING_COMMAND";
pub const UNKNOWN_COMMAND: &str = "UNKNOWN_COMMAND";
pub const ROOM_NOT_FOUND: &str = "ROOM_NOT_FOUND";
pub const CHANNEL_NOT_FOUND: &str = "CHANNEL_NOT_FOUND";
pub const OPERATOR_AUTH_FAILED: &str = "OPERATOR_AUTH_FAILED";
pub const FEATURE_DISABLED: &str = "FEATURE_DISABLED";

pub const CASIL_POLICY_BLOCKED_SECRET: &str = "CASIL_POLICY_BLOCKED_SECRET";
pub const CASIL_POLICY_OVERSIZE: &str = "CASIL_POLICY_OVERSIZE";
pub const CASIL_POLICY_REDACTED: &str = "CASIL_POLICY_REDACTED";
pub const CASIL_OUT_OF_SCOPE: &str = "CASIL_OUT_OF_SCOPE";
pub const CASIL_DISABLED: &str = "CASIL_DISABLED";
pub const CASIL_MONITOR_MODE: &str = "CASIL_MONITOR_MODE";
pub const CASIL_INTERNAL_ERROR: &str = "CASIL_INTERNAL_ERROR";

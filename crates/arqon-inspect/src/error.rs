/// CASIL reason codes, attached to every inspection outcome so callers and
/// audit logs can tell *why* a decision was made.
pub const CASIL_POLICY_BLOCKED_SECRET: &str = "CASIL_POLICY_BLOCKED_SECRET";
pub const CASIL_POLICY_OVERSIZE: &str = "CASIL_POLICY_OVERSIZE";
pub const CASIL_POLICY_REDACTED: &str = "CASIL_POLICY_REDACTED";
pub const CASIL_POLICY_ALLOWED: &str = "CASIL_POLICY_ALLOWED";
pub const CASIL_INTERNAL_ERROR: &str = "CASIL_INTERNAL_ERROR";
pub const CASIL_OUT_OF_SCOPE: &str = "CASIL_OUT_OF_SCOPE";
pub const CASIL_DISABLED: &str = "CASIL_DISABLED";
pub const CASIL_MONITOR_MODE: &str = "CASIL_MONITOR_MODE";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("CASIL inspection failed: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

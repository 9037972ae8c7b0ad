use crate::error::{Error, Result};

/// Runtime profile. Controls preflight strictness and wire-format enforcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }

    pub fn is_staging_or_prod(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Prod)
    }
}

/// Normalizes the handful of spellings the original accepted.
pub fn normalize(raw: &str) -> Result<Environment> {
    match raw.trim().to_lowercase().as_str() {
        "development" | "dev" => Ok(Environment::Dev),
        "staging" => Ok(Environment::Staging),
        "production" | "prod" => Ok(Environment::Prod),
        other => Err(Error::Invalid(format!(
            "unsupported environment profile: {other}. expected one of: dev, staging, prod"
        ))),
    }
}

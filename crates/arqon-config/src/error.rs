use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("configuration failed preflight: {0:?}")]
    Preflight(Vec<String>),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no operators registered for group '{0}'")]
    NoOperators(String),

    #[error("operator auth failed for client {0}")]
    AuthFailed(String),

    #[error("routing error: {0}")]
    Routing(#[from] arqon_router::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

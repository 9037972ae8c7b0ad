use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("message not found: {0}")]
    NotFound(String),

    #[error("storage backend failed in strict mode: {0}")]
    Strict(String),

    #[error("consumer groups are not supported by this backend")]
    ConsumerGroupsUnsupported,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope error: {0}")]
    Envelope(#[from] arqon_protocol::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

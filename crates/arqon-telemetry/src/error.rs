use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("telemetry emitter is not running")]
    NotRunning,

    #[error("failed to serialize telemetry event: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Errors produced while building, validating, or encoding an [`crate::Envelope`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("envelope failed validation: {0:?}")]
    Validation(Vec<String>),

    #[error("unsupported wire format for this configuration")]
    UnsupportedWireFormat,

    #[error("json encode/decode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encode/decode failed: {0}")]
    Binary(#[from] Box<bincode::ErrorKind>),
}

pub type Result<T> = std::result::Result<T, Error>;

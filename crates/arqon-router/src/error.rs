use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("channel not found: {room}/{channel}")]
    ChannelNotFound { room: String, channel: String },

    #[error("target client not available: {0}")]
    TargetUnavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;

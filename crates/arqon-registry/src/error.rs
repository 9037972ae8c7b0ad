use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("room not found: {0}")]
    RoomNotFound(String),

    #[error("channel not found: {room}/{channel}")]
    ChannelNotFound { room: String, channel: String },

    #[error("room already exists: {0}")]
    RoomExists(String),

    #[error("channel already exists: {room}/{channel}")]
    ChannelExists { room: String, channel: String },

    #[error("unknown client: {0}")]
    UnknownClient(String),
}

pub type Result<T> = std::result::Result<T, Error>;

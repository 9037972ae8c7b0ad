pub mod client;
pub mod error;
pub mod registry;
pub mod rooms;

pub use client::{ConnectedClient, OutboundSender};
pub use error::{Error, Result};
pub use registry::ClientRegistry;
pub use rooms::{Channel, Room, RoomRegistry};

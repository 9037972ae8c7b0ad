pub mod envelope;
pub mod error;
pub mod error_codes;
pub mod frames;
pub mod ids;
pub mod wire;

pub use envelope::{Envelope, EnvelopeType, ResponseStatus, PROTOCOL_VERSION};
pub use error::{Error, Result};
pub use wire::{RawFrame, WireFormat};

pub mod buffer;
pub mod emitter;
pub mod error;
pub mod event;
pub mod subscriber;

pub use emitter::TelemetryEmitter;
pub use error::{Error, Result};
pub use event::{EventType, Severity, TelemetryEvent};
pub use subscriber::{FanOutSink, NullFanOut};

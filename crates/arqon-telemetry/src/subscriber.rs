use async_trait::async_trait;

use crate::event::TelemetryEvent;

/// The telemetry fan-out peer: forwards drained events onto the bus
/// itself (conventionally, a broadcast to the configured telemetry
/// room) so any connected client can observe them. The gateway supplies
/// the real implementation; tests and standalone use of this crate can
/// use [`NullFanOut`].
#[async_trait]
pub trait FanOutSink: Send + Sync {
    async fn send(&self, event: &TelemetryEvent);
}

/// A fan-out sink that discards every event. Used when no bus
/// connection is available (e.g. telemetry disabled, or this crate
/// exercised standalone).
pub struct NullFanOut;

#[async_trait]
impl FanOutSink for NullFanOut {
    async fn send(&self, _event: &TelemetryEvent) {}
}

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arqon_config::TelemetryConfig;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::buffer::RingBuffer;
use crate::event::{EventType, Severity, TelemetryEvent};
use crate::subscriber::{FanOutSink, NullFanOut};

const DEFAULT_BUFFER_CAPACITY: usize = 1_000;
const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
pub struct EmitterStats {
    pub events_emitted: AtomicU64,
    pub events_dropped: AtomicU64,
    pub flush_errors: AtomicU64,
}

/// Unified telemetry event emitter.
///
/// `emit_event` and its typed helpers are non-blocking: an event lands
/// in a bounded ring buffer (oldest-first drop on overflow) and a
/// background task periodically drains it to subscribers and the
/// fan-out peer.
pub struct TelemetryEmitter {
    enabled: bool,
    buffer: Mutex<RingBuffer>,
    flush_interval: Duration,
    subscribers: broadcast::Sender<TelemetryEvent>,
    fan_out: Arc<dyn FanOutSink>,
    stats: EmitterStats,
    running: AtomicBool,
}

impl TelemetryEmitter {
    pub fn new(config: &TelemetryConfig, fan_out: Arc<dyn FanOutSink>) -> Self {
        Self::with_capacity(config, fan_out, DEFAULT_BUFFER_CAPACITY, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_capacity(
        config: &TelemetryConfig,
        fan_out: Arc<dyn FanOutSink>,
        buffer_capacity: usize,
        flush_interval: Duration,
    ) -> Self {
        let (subscribers, _) = broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        Self {
            enabled: config.enabled,
            buffer: Mutex::new(RingBuffer::new(buffer_capacity)),
            flush_interval,
            subscribers,
            fan_out,
            stats: EmitterStats::default(),
            running: AtomicBool::new(false),
        }
    }

    /// Builds an emitter with no fan-out peer. Useful for tests and
    /// components that only care about the subscriber channel.
    pub fn disconnected(config: &TelemetryConfig) -> Self {
        Self::new(config, Arc::new(NullFanOut))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Subscribes to the live event stream. Lagging subscribers drop
    /// the oldest unseen events per `tokio::sync::broadcast` semantics
    /// rather than stalling the emitter.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.subscribers.subscribe()
    }

    /// Spawns the background flush task. Returns a handle the caller
    /// should hold and `.abort()` (or let drop) on shutdown after a
    /// final [`Self::flush`].
    pub fn spawn(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.enabled {
            info!("telemetry emitter disabled, not starting flush task");
            return None;
        }
        self.running.store(true, Ordering::SeqCst);
        let emitter = Arc::clone(self);
        Some(tokio::spawn(async move {
            while emitter.running.load(Ordering::SeqCst) {
                tokio::time::sleep(emitter.flush_interval).await;
                emitter.flush().await;
            }
        }))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Records an event. Never blocks beyond a short mutex hold;
    /// returns `false` without error if telemetry is disabled.
    pub async fn emit_event(
        &self,
        event_type: EventType,
        client_id: Option<String>,
        message_id: Option<String>,
        metadata: Map<String, Value>,
        severity: Severity,
    ) -> bool {
        if !self.enabled {
            return false;
        }

        let mut event = TelemetryEvent::new(event_type, severity).with_metadata(metadata);
        if let Some(id) = client_id {
            event = event.with_client(id);
        }
        if let Some(id) = message_id {
            event = event.with_message(id);
        }

        let evicted = {
            let mut buffer = self.buffer.lock().await;
            buffer.push(event.clone())
        };
        if evicted {
            self.stats.events_dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.events_emitted.fetch_add(1, Ordering::Relaxed);

        // Broadcast has no subscribers yet on a fresh emitter; that's
        // not an error, so ignore the send result.
        let _ = self.subscribers.send(event);
        true
    }

    /// Drains the buffer and forwards every event to the fan-out peer.
    pub async fn flush(&self) {
        let events = {
            let mut buffer = self.buffer.lock().await;
            if buffer.is_empty() {
                return;
            }
            buffer.drain()
        };

        let count = events.len();
        for event in &events {
            self.fan_out.send(event).await;
        }
        debug!(count, "flushed telemetry events to fan-out peer");
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.events_emitted.load(Ordering::Relaxed),
            self.stats.events_dropped.load(Ordering::Relaxed),
        )
    }

    // --- Client lifecycle -------------------------------------------------

    pub async fn client_connected(&self, client_id: &str) {
        self.emit_event(EventType::ClientConnected, Some(client_id.to_string()), None, Map::new(), Severity::Info)
            .await;
    }

    pub async fn client_disconnected(&self, client_id: &str) {
        self.emit_event(EventType::ClientDisconnected, Some(client_id.to_string()), None, Map::new(), Severity::Info)
            .await;
    }

    pub async fn client_authenticated(&self, client_id: &str) {
        self.emit_event(
            EventType::ClientAuthenticated,
            Some(client_id.to_string()),
            None,
            Map::new(),
            Severity::Info,
        )
        .await;
    }

    // --- Message lifecycle --------------------------------------------------

    pub async fn message_sent(&self, message_id: &str, client_id: &str) {
        self.emit_event(
            EventType::MessageSent,
            Some(client_id.to_string()),
            Some(message_id.to_string()),
            Map::new(),
            Severity::Info,
        )
        .await;
    }

    pub async fn message_routed(&self, message_id: &str, recipients: usize) {
        let mut metadata = Map::new();
        metadata.insert("recipients".to_string(), Value::from(recipients));
        self.emit_event(EventType::MessageRouted, None, Some(message_id.to_string()), metadata, Severity::Info).await;
    }

    pub async fn message_failed(&self, message_id: &str, error: &str) {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), Value::from(error));
        self.emit_event(EventType::MessageFailed, None, Some(message_id.to_string()), metadata, Severity::Warning)
            .await;
    }

    // --- System lifecycle ----------------------------------------------

    pub async fn system_started(&self) {
        self.emit_event(EventType::SystemStarted, None, None, Map::new(), Severity::Info).await;
    }

    pub async fn system_stopped(&self) {
        self.emit_event(EventType::SystemStopped, None, None, Map::new(), Severity::Info).await;
    }

    pub async fn system_error(&self, error: &str) {
        let mut metadata = Map::new();
        metadata.insert("error".to_string(), Value::from(error));
        self.emit_event(EventType::SystemError, None, None, metadata, Severity::Error).await;
    }

    // --- Security --------------------------------------------------------

    pub async fn security_violation(&self, violation_type: &str, client_id: Option<&str>) {
        let mut metadata = Map::new();
        metadata.insert("violation_type".to_string(), Value::from(violation_type));
        self.emit_event(
            EventType::SecurityViolation,
            client_id.map(str::to_string),
            None,
            metadata,
            Severity::Warning,
        )
        .await;
    }

    pub async fn authentication_failed(&self, client_id: &str, reason: &str) {
        let mut metadata = Map::new();
        metadata.insert("reason".to_string(), Value::from(reason));
        warn!(client_id, reason, "authentication failed");
        self.emit_event(
            EventType::AuthenticationFailed,
            Some(client_id.to_string()),
            None,
            metadata,
            Severity::Warning,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingFanOut {
        count: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl FanOutSink for CountingFanOut {
        async fn send(&self, _event: &TelemetryEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn disabled_emitter_drops_everything() {
        let mut config = TelemetryConfig::default();
        config.enabled = false;
        let emitter = TelemetryEmitter::disconnected(&config);
        let emitted = emitter.emit_event(EventType::SystemInfo, None, None, Map::new(), Severity::Info).await;
        assert!(!emitted);
        let (emitted_count, _) = emitter.stats();
        assert_eq!(emitted_count, 0);
    }

    #[tokio::test]
    async fn emit_then_flush_reaches_fan_out() {
        let config = TelemetryConfig::default();
        let sink = Arc::new(CountingFanOut { count: AtomicUsize::new(0) });
        let emitter = TelemetryEmitter::new(&config, sink.clone());

        emitter.system_started().await;
        emitter.client_connected("client-1").await;
        emitter.flush().await;

        assert_eq!(sink.count.load(Ordering::SeqCst), 2);
        let (emitted, dropped) = emitter.stats();
        assert_eq!(emitted, 2);
        assert_eq!(dropped, 0);
    }

    #[tokio::test]
    async fn subscriber_receives_emitted_events() {
        let config = TelemetryConfig::default();
        let emitter = Arc::new(TelemetryEmitter::disconnected(&config));
        let mut rx = emitter.subscribe();

        emitter.message_sent("msg-1", "client-1").await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type.as_str(), "message_sent");
        assert_eq!(event.message_id.as_deref(), Some("msg-1"));
    }

    #[tokio::test]
    async fn overflow_increments_dropped_counter() {
        let config = TelemetryConfig::default();
        let emitter = TelemetryEmitter::with_capacity(&config, Arc::new(NullFanOut), 2, DEFAULT_FLUSH_INTERVAL);

        emitter.system_started().await;
        emitter.system_started().await;
        emitter.system_started().await;

        let (_, dropped) = emitter.stats();
        assert_eq!(dropped, 1);
    }
}

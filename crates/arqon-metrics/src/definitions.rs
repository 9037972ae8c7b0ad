//! Metric name and label definitions.
//!
//! Centralizes every metric name emitted by the broker so instrumentation
//! sites and dashboards agree on spelling.

/// WebSocket connection metrics
pub mod websocket {
    pub const CONNECTIONS_TOTAL: &str = "arqonbus_websocket_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "arqonbus_websocket_connections_active";
    pub const MESSAGES_RECEIVED_TOTAL: &str = "arqonbus_websocket_messages_received_total";
    pub const MESSAGES_SENT_TOTAL: &str = "arqonbus_websocket_messages_sent_total";
    pub const MESSAGE_DURATION_SECONDS: &str = "arqonbus_websocket_message_duration_seconds";
    pub const AUTH_FAILURES_TOTAL: &str = "arqonbus_websocket_auth_failures_total";
    pub const CONNECTIONS_REJECTED_TOTAL: &str = "arqonbus_websocket_connections_rejected_total";
}

/// Routing/broadcast metrics
pub mod routing {
    pub const MESSAGES_ROUTED_TOTAL: &str = "arqonbus_routing_messages_routed_total";
    pub const ROUTE_DURATION_SECONDS: &str = "arqonbus_routing_route_duration_seconds";
    pub const ROUTE_ERRORS_TOTAL: &str = "arqonbus_routing_route_errors_total";
    pub const BROADCAST_RECIPIENTS: &str = "arqonbus_routing_broadcast_recipients";
}

/// Task dispatch metrics
pub mod dispatch {
    pub const TASKS_DISPATCHED_TOTAL: &str = "arqonbus_dispatch_tasks_dispatched_total";
    pub const DISPATCH_ERRORS_TOTAL: &str = "arqonbus_dispatch_errors_total";
    pub const COMPETING_WINNERS_TOTAL: &str = "arqonbus_dispatch_competing_winners_total";
    pub const COMPETING_TIMEOUTS_TOTAL: &str = "arqonbus_dispatch_competing_timeouts_total";
    pub const OPERATORS_ACTIVE: &str = "arqonbus_dispatch_operators_active";
}

/// Storage backend metrics
pub mod storage {
    pub const OPERATIONS_TOTAL: &str = "arqonbus_storage_operations_total";
    pub const OPERATION_DURATION_SECONDS: &str = "arqonbus_storage_operation_duration_seconds";
    pub const ERRORS_TOTAL: &str = "arqonbus_storage_errors_total";
    pub const DEGRADED: &str = "arqonbus_storage_degraded";
}

/// Content-inspection (CASIL) metrics
pub mod casil {
    pub const INSPECTIONS_TOTAL: &str = "arqonbus_casil_inspections_total";
    pub const BLOCKED_TOTAL: &str = "arqonbus_casil_blocked_total";
    pub const REDACTED_TOTAL: &str = "arqonbus_casil_redacted_total";
    pub const INSPECTION_DURATION_SECONDS: &str = "arqonbus_casil_inspection_duration_seconds";
}

/// Telemetry emitter metrics
pub mod telemetry {
    pub const EVENTS_EMITTED_TOTAL: &str = "arqonbus_telemetry_events_emitted_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "arqonbus_telemetry_events_dropped_total";
    pub const BUFFER_SIZE: &str = "arqonbus_telemetry_buffer_size";
}

/// System/runtime metrics
pub mod system {
    pub const UPTIME_SECONDS: &str = "arqonbus_uptime_seconds";
    pub const BUILD_INFO: &str = "arqonbus_build_info";
    pub const CONNECTED_CLIENTS: &str = "arqonbus_connected_clients";
}

/// Common label keys used across metrics
pub mod labels {
    pub const ROOM: &str = "room";
    pub const CHANNEL: &str = "channel";
    pub const STRATEGY: &str = "strategy";
    pub const BACKEND: &str = "backend";
    pub const OPERATION: &str = "operation";
    pub const ERROR_TYPE: &str = "error_type";
    pub const DECISION: &str = "decision";
    pub const STATUS: &str = "status";
}

/// Standard histogram buckets for broker-side durations.
pub mod buckets {
    use std::sync::LazyLock;

    /// Message/route processing duration buckets (seconds); covers 100us to 10s.
    pub static MESSAGE_DURATION: LazyLock<Vec<f64>> = LazyLock::new(|| {
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    });

    /// Storage operation duration buckets (seconds); covers 100us to 5s.
    pub static STORAGE_DURATION: LazyLock<Vec<f64>> =
        LazyLock::new(|| vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);

    /// CASIL inspection duration buckets (seconds); the inline gate must
    /// remain short, so this is narrow: 10us to 100ms.
    pub static CASIL_DURATION: LazyLock<Vec<f64>> =
        LazyLock::new(|| vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1]);
}

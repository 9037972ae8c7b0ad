//! Structured metrics snapshot for internal API/CLI consumption, kept
//! separate from the Prometheus text exposition format.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Counter,
    Gauge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub name: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub labels: HashMap<String, String>,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub total: u64,
    pub errors: u64,
    pub active: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricCategories {
    pub websocket: CategoryMetrics,
    pub routing: CategoryMetrics,
    pub dispatch: CategoryMetrics,
    pub storage: CategoryMetrics,
    pub casil: CategoryMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: u64,
    pub metrics: Vec<MetricSnapshot>,
    pub categories: MetricCategories,
}

impl MetricsSnapshot {
    pub fn new(timestamp_unix_millis: u64) -> Self {
        Self { timestamp: timestamp_unix_millis, metrics: Vec::new(), categories: MetricCategories::default() }
    }

    /// Best-effort parser for Prometheus exposition-format text, used to
    /// turn a rendered `/metrics` body back into structured JSON for the
    /// CLI's status output. Unparseable lines are skipped rather than
    /// failing the whole snapshot.
    pub fn from_prometheus_text(text: &str, timestamp_unix_millis: u64) -> Self {
        let mut snapshot = Self::new(timestamp_unix_millis);
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(metric) = parse_prometheus_line(line) {
                update_categories(&mut snapshot.categories, &metric);
                snapshot.metrics.push(metric);
            }
        }
        snapshot
    }
}

fn parse_prometheus_line(line: &str) -> Option<MetricSnapshot> {
    let (name_and_labels, value_str) = line.rsplit_once(' ')?;
    let value: f64 = value_str.parse().ok()?;

    let (name, labels) = if let Some(brace_start) = name_and_labels.find('{') {
        let name = &name_and_labels[..brace_start];
        let labels_str = name_and_labels.get(brace_start + 1..name_and_labels.len() - 1).unwrap_or("");
        (name, parse_labels(labels_str))
    } else {
        (name_and_labels, HashMap::new())
    };

    if name.ends_with("_bucket") || name.ends_with("_sum") {
        return None;
    }

    let metric_type = if name.ends_with("_total") || name.ends_with("_count") {
        MetricType::Counter
    } else {
        MetricType::Gauge
    };

    Some(MetricSnapshot { name: name.to_string(), metric_type, labels, value })
}

fn parse_labels(labels_str: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    if labels_str.is_empty() {
        return labels;
    }
    for part in labels_str.split(',') {
        if let Some((key, value)) = part.split_once('=') {
            labels.insert(key.to_string(), value.trim_matches('"').to_string());
        }
    }
    labels
}

fn update_categories(categories: &mut MetricCategories, metric: &MetricSnapshot) {
    let name = metric.name.as_str();
    let value = metric.value as u64;

    if name.starts_with("arqonbus_websocket_connections_total") {
        categories.websocket.total += value;
    } else if name.starts_with("arqonbus_websocket_connections_active") {
        categories.websocket.active = value;
    } else if name.starts_with("arqonbus_routing_messages_routed_total") {
        categories.routing.total += value;
    } else if name.starts_with("arqonbus_routing_route_errors_total") {
        categories.routing.errors += value;
    } else if name.starts_with("arqonbus_dispatch_tasks_dispatched_total") {
        categories.dispatch.total += value;
    } else if name.starts_with("arqonbus_dispatch_errors_total") {
        categories.dispatch.errors += value;
    } else if name.starts_with("arqonbus_dispatch_operators_active") {
        categories.dispatch.active = value;
    } else if name.starts_with("arqonbus_storage_operations_total") {
        categories.storage.total += value;
    } else if name.starts_with("arqonbus_storage_errors_total") {
        categories.storage.errors += value;
    } else if name.starts_with("arqonbus_casil_inspections_total") {
        categories.casil.total += value;
    } else if name.starts_with("arqonbus_casil_blocked_total") {
        categories.casil.errors += value;
    }
}

//! Metrics collection and export for ArqonBus.
//!
//! This crate wraps the `metrics` facade: call sites use its
//! `counter!`/`gauge!`/`histogram!` macros against the names defined here,
//! and [`init_metrics`] wires up a global recorder (Prometheus, when the
//! `prometheus` feature is enabled; a no-op recorder otherwise).

mod definitions;
mod recorder;
mod snapshot;

pub use definitions::*;
pub use recorder::{init_metrics, MetricsHandle, MetricsRecorderConfig};
pub use snapshot::{MetricCategories, MetricSnapshot, MetricType, MetricsSnapshot};

pub use metrics::{counter, gauge, histogram};

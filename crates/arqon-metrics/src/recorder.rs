//! Metrics recorder initialization and configuration.

use anyhow::Result;
use tracing::info;

/// Handle to the metrics system, providing access to exported metrics.
#[derive(Clone)]
pub struct MetricsHandle {
    #[cfg(feature = "prometheus")]
    prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

impl MetricsHandle {
    /// Render metrics in Prometheus text format for the `/metrics` endpoint.
    #[must_use]
    pub fn render(&self) -> String {
        #[cfg(feature = "prometheus")]
        {
            self.prometheus_handle.render()
        }
        #[cfg(not(feature = "prometheus"))]
        {
            String::new()
        }
    }
}

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    pub enabled: bool,
    pub global_labels: Vec<(String, String)>,
}

/// Initializes the metrics system once at startup. With the `prometheus`
/// feature enabled this installs a global Prometheus recorder; otherwise
/// `metrics`'s facade macros become no-ops.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<MetricsHandle> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(MetricsHandle {
            #[cfg(feature = "prometheus")]
            prometheus_handle: init_prometheus_disabled()?,
        });
    }

    #[cfg(feature = "prometheus")]
    {
        let handle = init_prometheus(config)?;
        info!("prometheus metrics exporter initialized");
        Ok(MetricsHandle { prometheus_handle: handle })
    }

    #[cfg(not(feature = "prometheus"))]
    {
        info!("metrics facade active without the prometheus feature");
        Ok(MetricsHandle {})
    }
}

#[cfg(feature = "prometheus")]
fn init_prometheus(config: MetricsRecorderConfig) -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    use crate::buckets;
    use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

    let mut builder = PrometheusBuilder::new();

    builder = builder
        .set_buckets_for_metric(
            Matcher::Suffix("_message_duration_seconds".to_string()),
            &buckets::MESSAGE_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("_operation_duration_seconds".to_string()),
            &buckets::STORAGE_DURATION,
        )?
        .set_buckets_for_metric(
            Matcher::Full(crate::casil::INSPECTION_DURATION_SECONDS.to_string()),
            &buckets::CASIL_DURATION,
        )?;

    for (key, value) in config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    Ok(builder.install_recorder()?)
}

#[cfg(feature = "prometheus")]
fn init_prometheus_disabled() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    Ok(metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?)
}

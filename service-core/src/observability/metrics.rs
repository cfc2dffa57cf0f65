use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return the render handle.
/// Call once at startup, before any counter is touched.
pub fn init_metrics() -> Result<PrometheusHandle, crate::error::AppError> {
    PrometheusBuilder::new().install_recorder().map_err(|e| {
        crate::error::AppError::ConfigError(anyhow::anyhow!(
            "Failed to install Prometheus recorder: {}",
            e
        ))
    })
}

//! Prometheus metrics infrastructure

use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Prometheus metrics handle for serving metrics endpoint
#[derive(Clone)]
pub struct PrometheusMetrics {
    handle: Arc<PrometheusHandle>,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish_non_exhaustive()
    }
}

impl PrometheusMetrics {
    /// Get the metrics as a string for the /metrics endpoint
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Initialize Prometheus metrics
pub fn init_metrics(config: &MetricsConfig) -> Option<PrometheusMetrics> {
    if !config.enabled {
        tracing::info!("Prometheus metrics disabled");
        return None;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            gauge!("chain_controller_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);

            tracing::info!("Prometheus metrics initialized at {}", config.path);

            Some(PrometheusMetrics {
                handle: Arc::new(handle),
            })
        }
        Err(e) => {
            tracing::error!("Failed to initialize Prometheus metrics: {}", e);
            None
        }
    }
}

/// Create the metrics router
pub fn create_metrics_router(metrics: PrometheusMetrics, path: &str) -> Router {
    Router::new()
        .route(path, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<PrometheusMetrics>) -> impl IntoResponse {
    metrics.render()
}

fn status_label(success: bool) -> String {
    if success { "success" } else { "error" }.to_string()
}

/// Record a finished chain run
pub fn record_chain_run(success: bool, duration: Duration) {
    let labels = [("status", status_label(success))];

    counter!("chain_runs_total", &labels).increment(1);
    histogram!("chain_run_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record one step call against a target service
pub fn record_step_call(service: &str, success: bool, duration: Duration) {
    let labels = [
        ("service", service.to_string()),
        ("status", status_label(success)),
    ];

    counter!("chain_step_calls_total", &labels).increment(1);
    histogram!("chain_step_duration_seconds", &labels).record(duration.as_secs_f64());
}

/// Record a conditional routing jump
pub fn record_routing_jump(action: &str) {
    counter!("chain_routing_jumps_total", "action" => action.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_label() {
        assert_eq!(status_label(true), "success");
        assert_eq!(status_label(false), "error");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_chain_run(true, Duration::from_millis(10));
        record_step_call("intent", false, Duration::from_millis(3));
        record_routing_jump("jump_to_step");
    }

    #[test]
    fn test_disabled_metrics() {
        let config = MetricsConfig {
            enabled: false,
            path: "/metrics".to_string(),
        };

        assert!(init_metrics(&config).is_none());
    }
}

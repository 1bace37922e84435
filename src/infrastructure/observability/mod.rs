//! Observability infrastructure - Prometheus metrics

mod metrics;

pub use metrics::{
    create_metrics_router, init_metrics, record_chain_run, record_routing_jump, record_step_call,
    PrometheusMetrics,
};

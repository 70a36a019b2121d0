// src/utils/metrics.rs

use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_gauge, register_histogram, Counter, Encoder, Gauge, Histogram,
    TextEncoder,
};
use tracing::error;

pub static CYCLES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_cycles_total",
        "Total number of completed monitoring cycles."
    )
    .expect("Failed to register CYCLES_TOTAL counter")
});

pub static CYCLE_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_cycle_failures_total",
        "Total number of monitoring cycles aborted by an unhandled error."
    )
    .expect("Failed to register CYCLE_FAILURES_TOTAL counter")
});

pub static DOCS_BUILT_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_docs_built_total",
        "Total number of workflow documents built."
    )
    .expect("Failed to register DOCS_BUILT_TOTAL counter")
});

pub static BATCH_ITEM_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_batch_item_failures_total",
        "Total number of per-item failures dropped from fan-out batches."
    )
    .expect("Failed to register BATCH_ITEM_FAILURES_TOTAL counter")
});

pub static BATCH_TIMEOUTS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_batch_timeouts_total",
        "Total number of fan-out batches cut short by the batch timeout."
    )
    .expect("Failed to register BATCH_TIMEOUTS_TOTAL counter")
});

pub static PREDICTIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_predictions_total",
        "Total number of prediction records inserted."
    )
    .expect("Failed to register PREDICTIONS_TOTAL counter")
});

pub static PUBLISH_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_publish_failures_total",
        "Total number of documents that failed to publish to the message bus."
    )
    .expect("Failed to register PUBLISH_FAILURES_TOTAL counter")
});

pub static OPERATOR_NOTIFICATIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "monitor_operator_notifications_total",
        "Total number of operator notifications emitted."
    )
    .expect("Failed to register OPERATOR_NOTIFICATIONS_TOTAL counter")
});

pub static RUNNING_WORKFLOWS: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "monitor_running_workflows",
        "Number of running workflows seen in the last cycle."
    )
    .expect("Failed to register RUNNING_WORKFLOWS gauge")
});

pub static CYCLE_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "monitor_cycle_duration_seconds",
        "Histogram of end-to-end monitoring cycle durations."
    )
    .expect("Failed to register CYCLE_DURATION_SECONDS histogram")
});

/// Axum handler for /metrics.
pub async fn metrics_handler() -> (axum::http::StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Could not encode prometheus metrics: {}", e);
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("Could not encode prometheus metrics: {}", e),
        );
    }
    match String::from_utf8(buffer) {
        Ok(s) => (axum::http::StatusCode::OK, s),
        Err(e) => {
            error!("Prometheus metrics UTF-8 error: {}", e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Prometheus metrics UTF-8 error: {}", e),
            )
        }
    }
}

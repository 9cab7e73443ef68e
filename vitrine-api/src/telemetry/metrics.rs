//! Prometheus Metrics Definitions
//!
//! Defines all Vitrine metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, Encoder,
    HistogramVec, IntCounterVec, IntGaugeVec, TextEncoder,
};
use vitrine_sync::{QueueDepth, SyncMetricsSnapshot};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at first use
pub static METRICS: Lazy<ApiResult<VitrineMetrics>> = Lazy::new(VitrineMetrics::new);

/// The registered metrics, or `None` when registration failed.
pub fn metrics() -> Option<&'static VitrineMetrics> {
    METRICS.as_ref().ok()
}

/// Container for all Vitrine metrics.
#[derive(Clone)]
pub struct VitrineMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: IntCounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Propagation task outcomes - labels: outcome
    pub propagation_tasks_total: IntCounterVec,

    /// Cache lookups - labels: region (record/search), result (hit/miss/bypass)
    pub cache_lookups_total: IntCounterVec,

    /// Propagation queue depth - labels: state
    pub sync_queue_depth: IntGaugeVec,
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl VitrineMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_int_counter_vec!(
                "vitrine_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "vitrine_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            propagation_tasks_total: register_int_counter_vec!(
                "vitrine_propagation_tasks_total",
                "Propagation tasks processed by the sync workers",
                &["outcome"]
            )
            .map_err(|e| registration_error("propagation_tasks_total", e))?,

            cache_lookups_total: register_int_counter_vec!(
                "vitrine_cache_lookups_total",
                "Cache lookups by region and result",
                &["region", "result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            sync_queue_depth: register_int_gauge_vec!(
                "vitrine_sync_queue_depth",
                "Propagation tasks held by the queue",
                &["state"]
            )
            .map_err(|e| registration_error("sync_queue_depth", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, status_str.as_str()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record the source a cached read was answered from.
    pub fn record_cache_lookup(&self, region: &str, result: &str) {
        self.cache_lookups_total
            .with_label_values(&[region, result])
            .inc();
    }

    /// Bring the task counters up to a worker metrics snapshot.
    ///
    /// The snapshot counters only grow, so each counter is advanced by the
    /// difference to its current value.
    pub fn observe_sync(&self, snapshot: &SyncMetricsSnapshot) {
        for (outcome, total) in [
            ("applied", snapshot.applied),
            ("retried", snapshot.retried),
            ("parked", snapshot.parked),
            ("converted", snapshot.converted),
            ("queue_error", snapshot.queue_errors),
        ] {
            let counter = self.propagation_tasks_total.with_label_values(&[outcome]);
            let current = counter.get();
            if total > current {
                counter.inc_by(total - current);
            }
        }
    }

    /// Set the queue depth gauges.
    pub fn set_queue_depth(&self, depth: &QueueDepth) {
        for (state, count) in [
            ("ready", depth.ready),
            ("delayed", depth.delayed),
            ("in_flight", depth.in_flight),
            ("parked", depth.parked),
        ] {
            self.sync_queue_depth
                .with_label_values(&[state])
                .set(i64::try_from(count).unwrap_or(i64::MAX));
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Refreshes the sync gauges, then returns Prometheus text format metrics.
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
))]
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(m) = metrics() {
        match state.sync.status().await {
            Ok(status) => {
                m.set_queue_depth(&status.depth);
                m.observe_sync(&status.metrics);
            }
            Err(e) => tracing::warn!(error = %e, "sync status unavailable for metrics"),
        }
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_cache_lookup() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        let counter = metrics
            .cache_lookups_total
            .with_label_values(&["record", "hit"]);
        let before = counter.get();
        metrics.record_cache_lookup("record", "hit");
        assert_eq!(counter.get(), before + 1);
        Ok(())
    }

    #[test]
    fn test_observe_sync_is_monotonic() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        let snapshot = SyncMetricsSnapshot {
            applied: 1_000_000,
            ..SyncMetricsSnapshot::default()
        };
        metrics.observe_sync(&snapshot);
        metrics.observe_sync(&snapshot);
        let applied = metrics
            .propagation_tasks_total
            .with_label_values(&["applied"])
            .get();
        assert_eq!(applied, 1_000_000);

        // An older snapshot never moves the counter backwards
        metrics.observe_sync(&SyncMetricsSnapshot::default());
        assert_eq!(
            metrics
                .propagation_tasks_total
                .with_label_values(&["applied"])
                .get(),
            1_000_000
        );
        Ok(())
    }

    #[test]
    fn test_set_queue_depth() -> Result<(), String> {
        let metrics = metrics().ok_or("metrics not registered")?;
        metrics.set_queue_depth(&QueueDepth {
            ready: 3,
            delayed: 1,
            in_flight: 0,
            parked: 2,
        });
        assert_eq!(metrics.sync_queue_depth.with_label_values(&["parked"]).get(), 2);
        Ok(())
    }
}

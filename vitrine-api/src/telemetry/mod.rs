//! Vitrine Telemetry - Observability Infrastructure
//!
//! Structured logging through tracing-subscriber and Prometheus metrics
//! for the HTTP layer, the cache regions and the sync workers.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, VitrineMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};

//! Inkwell Telemetry - Observability Infrastructure
//!
//! Structured logging via `tracing` and Prometheus metrics for the
//! dispatch core and its transports.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics, metrics_handler, InkwellMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_tracer, LogFormat, TelemetryConfig};

//! Prometheus Metrics Definitions
//!
//! Defines the dispatch metrics with their labels. Exposed at `/metrics`
//! for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// Latency buckets (seconds): 1ms .. 10s
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once on first use
pub static METRICS: Lazy<ApiResult<InkwellMetrics>> = Lazy::new(InkwellMetrics::new);

/// The registered metrics, or `None` if registration failed (logged once).
pub fn metrics() -> Option<&'static InkwellMetrics> {
    match METRICS.as_ref() {
        Ok(metrics) => Some(metrics),
        Err(e) => {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| tracing::error!(error = %e, "Metrics unavailable"));
            None
        }
    }
}

/// Container for all Inkwell metrics.
#[derive(Clone)]
pub struct InkwellMetrics {
    /// HTTP request counter - labels: method, route, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, route
    pub http_request_duration_seconds: HistogramVec,

    /// Dispatched actions - labels: service, action, transport, outcome
    pub actions_total: CounterVec,

    /// Dispatch pipeline duration - labels: service, action
    pub action_duration_seconds: HistogramVec,

    /// Action cache lookups - labels: service, result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Cache entries dropped by invalidation - labels: service
    pub cache_invalidations_total: CounterVec,

    /// Notification events published - labels: service, verb
    pub notifications_total: CounterVec,

    /// Current active WebSocket connections
    pub websocket_connections: Gauge,
}

impl InkwellMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "inkwell_http_requests_total",
                "Total number of HTTP requests",
                &["method", "route", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "inkwell_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "route"],
                LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            actions_total: register_counter_vec!(
                "inkwell_actions_total",
                "Total number of dispatched actions",
                &["service", "action", "transport", "outcome"]
            )
            .map_err(|e| registration_error("actions_total", e))?,

            action_duration_seconds: register_histogram_vec!(
                "inkwell_action_duration_seconds",
                "Dispatch pipeline duration in seconds",
                &["service", "action"],
                LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("action_duration_seconds", e))?,

            cache_lookups_total: register_counter_vec!(
                "inkwell_cache_lookups_total",
                "Action cache lookups",
                &["service", "result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            cache_invalidations_total: register_counter_vec!(
                "inkwell_cache_invalidations_total",
                "Action cache entries dropped by invalidation",
                &["service"]
            )
            .map_err(|e| registration_error("cache_invalidations_total", e))?,

            notifications_total: register_counter_vec!(
                "inkwell_notifications_total",
                "Notification events published",
                &["service", "verb"]
            )
            .map_err(|e| registration_error("notifications_total", e))?,

            websocket_connections: register_gauge!(
                "inkwell_websocket_connections",
                "Current number of active WebSocket connections"
            )
            .map_err(|e| registration_error("websocket_connections", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, route: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, route, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, route])
            .observe(duration_secs);
    }

    /// Record one pass through the dispatch pipeline.
    pub fn record_action(
        &self,
        service: &str,
        action: &str,
        transport: &str,
        outcome: &str,
        duration_secs: f64,
    ) {
        self.actions_total
            .with_label_values(&[service, action, transport, outcome])
            .inc();
        self.action_duration_seconds
            .with_label_values(&[service, action])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, service: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[service, result])
            .inc();
    }

    pub fn record_cache_invalidation(&self, service: &str, dropped: usize) {
        self.cache_invalidations_total
            .with_label_values(&[service])
            .inc_by(dropped as f64);
    }

    pub fn record_notification(&self, service: &str, verb: &str) {
        self.notifications_total
            .with_label_values(&[service, verb])
            .inc();
    }

    /// Increment WebSocket connection count.
    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    /// Decrement WebSocket connection count.
    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    // make sure our collectors are registered before the first scrape
    let _ = metrics();

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

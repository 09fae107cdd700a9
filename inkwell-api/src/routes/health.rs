//! Health Check Endpoints
//!
//! - /health/live - Process alive check
//! - /health/ready - Registry initialised and every collection answering
//!
//! No authentication required for health endpoints.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use inkwell_core::Filter;
use inkwell_storage::Collection;
use serde::{Deserialize, Serialize};

use crate::cache::CacheStats;
use crate::dispatcher::Dispatcher;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub registry: ComponentHealth,
    pub store: ComponentHealth,
    pub services: usize,
    pub cache: CacheStats,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn healthy(latency_ms: Option<u64>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            latency_ms,
            error: None,
        }
    }

    fn unhealthy(error: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

#[derive(Clone)]
pub struct HealthState {
    pub dispatcher: Dispatcher,
    pub start_time: Instant,
}

impl HealthState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
pub async fn readiness(State(state): State<HealthState>) -> impl IntoResponse {
    let registry = state.dispatcher.registry();

    let registry_health = if registry.is_initialized() {
        ComponentHealth::healthy(None)
    } else {
        ComponentHealth::unhealthy("Service registry not initialized".to_string())
    };
    let store_health = check_store(&state.dispatcher).await;

    let overall_status =
        if registry_health.status == HealthStatus::Healthy && store_health.status == HealthStatus::Healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            registry: registry_health,
            store: store_health,
            services: registry.len(),
            cache: state.dispatcher.cache().stats(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Count every collection once.
async fn check_store(dispatcher: &Dispatcher) -> ComponentHealth {
    let start = Instant::now();
    for service in dispatcher.registry().services() {
        if let Err(e) = service.collection.count(&Filter::All).await {
            return ComponentHealth::unhealthy(format!("Collection '{}' failed: {}", service.name, e));
        }
    }
    ComponentHealth::healthy(Some(u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(HealthState::new(dispatcher))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;
    use crate::cache::ActionCache;
    use crate::config::ApiConfig;
    use crate::error::ApiResult;
    use crate::registry::ServiceRegistry;
    use crate::service::{handler, ActionDefinition, ActionReply, ServiceDefinition};
    use axum::body::Body;
    use inkwell_storage::InMemoryCollection;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn dispatcher(init: bool) -> ApiResult<Dispatcher> {
        let mut registry = ServiceRegistry::new();
        registry.register(
            ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
                .action(ActionDefinition::new("find", handler(|_ctx| async { Ok(ActionReply::empty()) })))
                .build("salt")?,
        )?;
        if init {
            registry.init()?;
        }
        Ok(Dispatcher::new(
            Arc::new(registry),
            NotificationBus::new(4, ActionCache::default()),
            Arc::new(ApiConfig::default()),
        ))
    }

    async fn ready(dispatcher: Dispatcher) -> (StatusCode, serde_json::Value) {
        let response = create_router(dispatcher)
            .oneshot(axum::http::Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("All systems operational".to_string()),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
    }

    #[tokio::test]
    async fn test_ready_after_init() -> ApiResult<()> {
        let (status, body) = ready(dispatcher(true)?).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["details"]["services"], 1);
        assert_eq!(body["details"]["store"]["status"], "healthy");
        Ok(())
    }

    #[tokio::test]
    async fn test_not_ready_before_init() -> ApiResult<()> {
        let (status, body) = ready(dispatcher(false)?).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["details"]["registry"]["status"], "unhealthy");
        Ok(())
    }
}

//! HTTP Surface
//!
//! Composes every transport into one axum router:
//! - REST bindings derived from each registered service (`/api/...`)
//! - GraphQL endpoint and playground (`/graphql`)
//! - WebSocket transport (`/ws`)
//! - Health checks (`/health/*`) and Prometheus metrics (`/metrics`)
//!
//! Authentication is consumed, never enforced, at this layer: the auth
//! middleware attaches the caller when it can and the dispatcher's
//! permission check decides.

pub mod graphql;
pub mod health;
pub mod registrar;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::constants::{API_KEY_HEADER, REQUEST_ID_HEADER};
use crate::dispatcher::Dispatcher;
use crate::error::ApiResult;
use crate::middleware::{try_authenticate, AuthMiddlewareState};
use crate::telemetry::{metrics_handler, observability_middleware};

pub use graphql::create_router as graphql_router;
pub use health::create_router as health_router;
pub use registrar::service_router;

/// REST routes of every registered service.
pub fn rest_router(dispatcher: &Dispatcher) -> Router {
    dispatcher
        .registry()
        .services()
        .iter()
        .fold(Router::new(), |router, service| {
            router.merge(service_router(service.clone(), dispatcher.clone()))
        })
}

/// Create the complete router with every transport and layer.
///
/// Execution order of the layers: CORS -> trace -> observability -> auth
/// -> handler.
pub fn create_api_router(dispatcher: Dispatcher, auth_state: AuthMiddlewareState) -> ApiResult<Router> {
    let schema = graphql::build_schema(dispatcher.clone())?;
    let cors = build_cors_layer(dispatcher.config());

    let router = Router::new()
        .merge(rest_router(&dispatcher))
        .merge(graphql::create_router(schema))
        .merge(crate::ws::create_router(dispatcher.clone()))
        .merge(health::create_router(dispatcher))
        .route("/metrics", get(metrics_handler));

    Ok(router
        .layer(from_fn_with_state(auth_state, try_authenticate))
        .layer(from_fn(observability_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// Otherwise only the configured origins are allowed; `*.domain` entries
/// admit https subdomains.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!("CORS: allowing origins: {:?}", config.cors_origins);
        let config = config.clone();
        cors.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|origin| config.is_origin_allowed(origin))
        }))
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                HeaderName::from_static(API_KEY_HEADER),
            ])
            .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn preflight(config: &ApiConfig, origin: &str) -> Option<String> {
        let app = Router::new()
            .route("/api/tags", get(|| async { StatusCode::OK }))
            .layer(build_cors_layer(config));
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/tags")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    #[tokio::test]
    async fn test_development_mode_allows_any_origin() {
        let allowed = preflight(&ApiConfig::default(), "https://anywhere.test").await;
        assert_eq!(allowed.as_deref(), Some("*"));
    }

    #[tokio::test]
    async fn test_configured_origins_only() {
        let config = ApiConfig {
            cors_origins: vec!["https://blog.example.com".to_string(), "*.inkwell.dev".to_string()],
            ..ApiConfig::default()
        };

        let exact = preflight(&config, "https://blog.example.com").await;
        assert_eq!(exact.as_deref(), Some("https://blog.example.com"));

        let wildcard = preflight(&config, "https://admin.inkwell.dev").await;
        assert_eq!(wildcard.as_deref(), Some("https://admin.inkwell.dev"));

        assert_eq!(preflight(&config, "https://evil.com").await, None);
    }
}

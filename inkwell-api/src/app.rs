//! Application assembly
//!
//! Wires registry, cache, bus, dispatcher, auth and router together. The
//! server binary and the integration tests both start from [`build_app`].

use std::sync::Arc;

use axum::Router;

use crate::auth::AuthConfig;
use crate::bus::NotificationBus;
use crate::cache::ActionCache;
use crate::config::ApiConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ApiResult;
use crate::middleware::AuthMiddlewareState;
use crate::registry::ServiceRegistry;
use crate::routes::create_api_router;
use crate::seed::{seed_demo, SeedReport};
use crate::services::{register_all, PERSONS};

/// A fully wired application.
#[derive(Debug, Clone)]
pub struct App {
    pub router: Router,
    pub dispatcher: Dispatcher,
    pub seed: SeedReport,
}

/// Register and initialise the blog services.
pub fn build_registry(config: &ApiConfig) -> ApiResult<ServiceRegistry> {
    let mut registry = ServiceRegistry::new();
    register_all(&mut registry, &config.id_salt)?;
    registry.init()?;
    Ok(registry)
}

pub async fn build_app(config: ApiConfig, auth_config: AuthConfig) -> ApiResult<App> {
    let registry = build_registry(&config)?;

    let seed = if config.seed_demo {
        seed_demo(&registry).await?
    } else {
        SeedReport::default()
    };

    if config.is_development() {
        for route in registry.route_table() {
            tracing::info!(method = route.method, path = %route.path, service = %route.service, action = %route.action, "route");
        }
    }

    let persons = registry.get(PERSONS)?.handle();
    let cache = ActionCache::new(config.cache_enabled, config.cache_ttl);
    let bus = NotificationBus::new(config.ws_capacity, cache);
    let dispatcher = Dispatcher::new(Arc::new(registry), bus, Arc::new(config));

    let router = create_api_router(dispatcher.clone(), AuthMiddlewareState::new(auth_config, persons))?;
    tracing::info!(services = dispatcher.registry().len(), "Application assembled");

    Ok(App {
        router,
        dispatcher,
        seed,
    })
}

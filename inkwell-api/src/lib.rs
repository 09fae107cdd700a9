//! Inkwell API - Service Dispatch Core
//!
//! One declarative service/action model served over three transports:
//! REST routes (axum), a WebSocket channel and a GraphQL schema. Every
//! request, whatever its transport, runs through the same dispatcher
//! pipeline: model resolution, permission check, action cache, handler,
//! serialization with reference population, change notification.

pub mod app;
pub mod auth;
pub mod bus;
pub mod cache;
pub mod config;
pub mod constants;
pub mod context;
pub mod crud;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod middleware;
pub mod populate;
pub mod registry;
pub mod routes;
pub mod seed;
pub mod service;
pub mod services;
pub mod slug;
pub mod telemetry;
pub mod ws;

// Re-export commonly used types
pub use app::{build_app, build_registry, App};
pub use auth::{generate_jwt_token, validate_jwt_token, AuthConfig, Claims, JwtSecret};
pub use bus::NotificationBus;
pub use cache::{get_cache_key, ActionCache, CacheScope};
pub use config::ApiConfig;
pub use context::{Context, RawRequest};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{ApiError, ApiResult, ErrorCode, ErrorKind};
pub use events::{ChangeVerb, LifecycleEvent, NotificationEvent, Transport};
pub use middleware::{try_authenticate, AuthMiddlewareState, MaybeUser};
pub use registry::{RouteEntry, ServiceRegistry};
pub use routes::create_api_router;
pub use service::{
    handler, ActionDefinition, ActionReply, Params, Payload, PopulateRule, ServiceDefinition,
    ServiceHandle,
};

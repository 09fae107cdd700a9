//! Dispatcher
//!
//! Runs the fixed pipeline for every request, whatever the transport:
//!
//! build context → resolve model → check permission → cache lookup →
//! handler → serialize (allow-list + population) → notify → cache fill
//!
//! Everything after context construction sits inside one failure boundary.
//! Failures are logged once here and returned as [`ApiError`]s; transports
//! only render them.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::bus::NotificationBus;
use crate::cache::{get_cache_key, ActionCache, CacheScope};
use crate::config::ApiConfig;
use crate::context::{Context, RawRequest};
use crate::error::{ApiError, ApiResult, ErrorKind};
use crate::events::{ChangeVerb, LifecycleEvent, NotificationEvent, Transport};
use crate::populate::{populate_model, populate_models};
use crate::registry::ServiceRegistry;
use crate::service::{ActionDefinition, Payload, ServiceDefinition};
use crate::telemetry::metrics;

/// Result of one pass through the pipeline.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Correlation id of the request.
    pub request_id: Uuid,
    pub result: ApiResult<JsonValue>,
}

/// Shared dispatcher. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    bus: NotificationBus,
    config: Arc<ApiConfig>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>, bus: NotificationBus, config: Arc<ApiConfig>) -> Self {
        Self {
            registry,
            bus,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    pub fn cache(&self) -> &ActionCache {
        self.bus.cache()
    }

    pub fn config(&self) -> &Arc<ApiConfig> {
        &self.config
    }

    /// Dispatch by service and action name (socket and GraphQL transports).
    pub async fn dispatch(
        &self,
        transport: Transport,
        service: &str,
        action: &str,
        raw: RawRequest,
    ) -> DispatchOutcome {
        let resolved = self
            .registry
            .get(service)
            .and_then(|def| def.action(action).map(|action| (def, action)));

        match resolved {
            Ok((service, action)) => self.dispatch_to(transport, service, action, raw).await,
            Err(error) => {
                tracing::debug!(service, action, transport = %transport, error = %error, "unroutable request");
                DispatchOutcome {
                    request_id: Uuid::now_v7(),
                    result: Err(error),
                }
            }
        }
    }

    /// Dispatch to an already-resolved action (REST bindings).
    pub async fn dispatch_to(
        &self,
        transport: Transport,
        service: Arc<ServiceDefinition>,
        action: Arc<ActionDefinition>,
        raw: RawRequest,
    ) -> DispatchOutcome {
        let mut ctx = Context::from_request(transport, service, action, raw, self.config.clone());
        let request_id = ctx.id;
        let service_name = ctx.service.name.clone();
        let action_name = ctx.action.name.clone();

        self.bus.emit_lifecycle(LifecycleEvent::Request {
            request_id,
            transport,
            service: service_name.clone(),
            action: action_name.clone(),
        });

        let started = Instant::now();
        let mut cache_hit = false;
        let result = self.run_pipeline(&mut ctx, &mut cache_hit).await;
        let elapsed = started.elapsed();

        let outcome = match &result {
            Ok(_) if cache_hit => "cache_hit",
            Ok(_) => "ok",
            Err(_) => "error",
        };
        if let Some(metrics) = metrics() {
            metrics.record_action(
                &service_name,
                &action_name,
                transport.as_str(),
                outcome,
                elapsed.as_secs_f64(),
            );
        }

        if let Err(error) = &result {
            match error.kind() {
                ErrorKind::Internal => tracing::error!(
                    request_id = %request_id,
                    service = %service_name,
                    action = %action_name,
                    transport = %transport,
                    code = %error.code,
                    "{}", error.message
                ),
                _ => tracing::warn!(
                    request_id = %request_id,
                    service = %service_name,
                    action = %action_name,
                    transport = %transport,
                    code = %error.code,
                    "{}", error.message
                ),
            }
        }

        self.bus.emit_lifecycle(LifecycleEvent::Response {
            request_id,
            transport,
            service: service_name,
            action: action_name,
            error: result.as_ref().err().map(|e| e.code),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            cache_hit,
        });

        DispatchOutcome { request_id, result }
    }

    async fn run_pipeline(&self, ctx: &mut Context, cache_hit: &mut bool) -> ApiResult<JsonValue> {
        if let Some(rejection) = ctx.take_rejection() {
            return Err(rejection);
        }

        ctx.resolve_model().await?;
        ctx.check_permission()?;

        let cache = self.bus.cache();
        let service = ctx.service.clone();
        let action = ctx.action.clone();

        let cache_slot = match action.cache {
            Some(scope) if cache.is_enabled() => {
                let caller = match scope {
                    CacheScope::Shared => None,
                    CacheScope::PerUser => Some(ctx.user.as_ref().map_or("", |u| u.code.as_str())),
                };
                let key = get_cache_key(&service.name, &action.name, &ctx.params, caller);
                let hit = cache.get(&key);
                if let Some(metrics) = metrics() {
                    metrics.record_cache_lookup(&service.name, hit.is_some());
                }
                if let Some(value) = hit {
                    *cache_hit = true;
                    return Ok(value);
                }
                Some((key, cache.generation(&service.name)))
            }
            _ => None,
        };

        let reply = (action.handler)(ctx.clone()).await?;
        let json = serialize_payload(&service, reply.payload).await;

        if let Some(verb) = reply.notify {
            notify_model_changes(&self.bus, ctx, verb, json.clone());
        }

        if let Some((key, generation)) = cache_slot {
            if !cache.put(&service.name, key, json.clone(), generation) {
                tracing::debug!(service = %service.name, action = %action.name, "skipped stale cache fill");
            }
        }

        Ok(json)
    }
}

/// Serialize a handler payload through the service's allow-list and
/// population map.
pub async fn serialize_payload(service: &ServiceDefinition, payload: Payload) -> JsonValue {
    match payload {
        Payload::Model(doc) => populate_model(service, service.to_json(&doc)).await,
        Payload::Models(docs) => {
            let mut json: Vec<JsonValue> = docs.iter().map(|doc| service.to_json(doc)).collect();
            populate_models(service, &mut json).await;
            JsonValue::Array(json)
        }
        Payload::Json(value) => value,
        Payload::Empty => JsonValue::Null,
    }
}

/// Publish a change notification for the context's service.
///
/// Runs synchronously before the response is written, so the service's
/// cache entries are gone before the caller sees the result.
pub fn notify_model_changes(bus: &NotificationBus, ctx: &Context, verb: ChangeVerb, json: JsonValue) {
    tracing::debug!(
        request_id = %ctx.id,
        service = %ctx.service.name,
        verb = %verb,
        "Model changed"
    );
    bus.publish(NotificationEvent {
        service: ctx.service.name.clone(),
        verb,
        payload: json,
        request_id: ctx.id,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::service::{handler, ActionReply};
    use inkwell_core::Permission;
    use inkwell_storage::InMemoryCollection;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dispatcher(calls: Arc<AtomicUsize>) -> ApiResult<Dispatcher> {
        let counted = calls.clone();
        let service = ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
            .permission(Permission::Public)
            .action(
                ActionDefinition::new(
                    "find",
                    handler(move |_ctx| {
                        let calls = counted.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            Ok(ActionReply::json(json!(["rust"])))
                        }
                    }),
                )
                .cached(),
            )
            .action(ActionDefinition::new(
                "create",
                handler(|_ctx| async { Ok(ActionReply::json(json!({"ok": true})).notify(ChangeVerb::Created)) }),
            ))
            .action(
                ActionDefinition::new("secret", handler(|_ctx| async { Ok(ActionReply::empty()) }))
                    .permission(Permission::LoggedIn),
            )
            .build("salt")?;

        let mut registry = ServiceRegistry::new();
        registry.register(service)?;
        registry.init()?;

        let cache = ActionCache::default();
        Ok(Dispatcher::new(
            Arc::new(registry),
            NotificationBus::new(16, cache),
            Arc::new(ApiConfig::default()),
        ))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_handler() -> ApiResult<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher(calls.clone())?;

        for _ in 0..3 {
            let outcome = dispatcher.dispatch(Transport::Rest, "tags", "find", RawRequest::new()).await;
            assert_eq!(outcome.result?, json!(["rust"]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        dispatcher.dispatch(Transport::Socket, "tags", "create", RawRequest::new()).await.result?;
        dispatcher.dispatch(Transport::Rest, "tags", "find", RawRequest::new()).await.result?;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_targets() -> ApiResult<()> {
        let dispatcher = dispatcher(Arc::new(AtomicUsize::new(0)))?;
        let outcome = dispatcher.dispatch(Transport::Rest, "nope", "find", RawRequest::new()).await;
        assert_eq!(outcome.result.map_err(|e| e.code), Err(ErrorCode::ServiceNotFound));

        let outcome = dispatcher.dispatch(Transport::Rest, "tags", "nope", RawRequest::new()).await;
        assert_eq!(outcome.result.map_err(|e| e.code), Err(ErrorCode::ActionNotFound));
        Ok(())
    }

    #[tokio::test]
    async fn test_lifecycle_pair_and_permission_failure() -> ApiResult<()> {
        let dispatcher = dispatcher(Arc::new(AtomicUsize::new(0)))?;
        let mut lifecycle = dispatcher.bus().subscribe_lifecycle();

        let outcome = dispatcher.dispatch(Transport::Graphql, "tags", "secret", RawRequest::new()).await;
        assert_eq!(outcome.result.as_ref().map_err(|e| e.code), Err(ErrorCode::Unauthorized));

        let request = lifecycle.recv().await.map_err(|e| ApiError::internal_error(e.to_string()))?;
        let response = lifecycle.recv().await.map_err(|e| ApiError::internal_error(e.to_string()))?;
        assert_eq!(request.event_type(), "request");
        assert_eq!(request.request_id(), outcome.request_id);
        match response {
            LifecycleEvent::Response { error, cache_hit, .. } => {
                assert_eq!(error, Some(ErrorCode::Unauthorized));
                assert!(!cache_hit);
            }
            other => panic!("expected response event, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_rejection_surfaces_inside_boundary() -> ApiResult<()> {
        let dispatcher = dispatcher(Arc::new(AtomicUsize::new(0)))?;
        let raw = RawRequest {
            rejection: Some(ApiError::invalid_input("Invalid JSON")),
            ..RawRequest::default()
        };
        let outcome = dispatcher.dispatch(Transport::Rest, "tags", "find", raw).await;
        assert_eq!(outcome.result.map_err(|e| e.code), Err(ErrorCode::InvalidInput));
        Ok(())
    }
}

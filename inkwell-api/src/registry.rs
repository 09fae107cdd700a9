//! Service Registry
//!
//! Process-wide map of service name to definition. Services are registered
//! once at boot, then `init` runs every service's hook in registration
//! order. The hook is the only place a service can look up its siblings;
//! the handles it binds are frozen onto the service afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::routes::registrar::{derive_bindings, full_paths};
use crate::service::{ServiceDefinition, ServiceHandle};

/// Registry of every service in the process.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: Vec<Arc<ServiceDefinition>>,
    index: HashMap<String, usize>,
    initialized: bool,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. Names are unique; registering after `init` fails.
    pub fn register(&mut self, service: ServiceDefinition) -> ApiResult<Arc<ServiceDefinition>> {
        if self.initialized {
            return Err(ApiError::internal_error(format!(
                "Cannot register '{}' after the registry was initialized",
                service.name
            )));
        }
        if self.index.contains_key(&service.name) {
            return Err(ApiError::new(
                ErrorCode::ServiceAlreadyRegistered,
                format!("Service '{}' is already registered", service.name),
            ));
        }

        tracing::debug!(service = %service.name, namespace = %service.namespace, "Registering service");
        let service = Arc::new(service);
        self.index.insert(service.name.clone(), self.services.len());
        self.services.push(service.clone());
        Ok(service)
    }

    /// Run every `init` hook once, in registration order.
    ///
    /// Population targets are bound automatically; a target that is not
    /// registered fails the whole init.
    pub fn init(&mut self) -> ApiResult<()> {
        if self.initialized {
            return Ok(());
        }

        for service in &self.services {
            let mut init = ServiceInit {
                registry: self,
                bound: HashMap::new(),
            };

            for rule in &service.populates {
                init.bind(&rule.service)?;
            }
            if let Some(hook) = service.init_hook() {
                hook(&mut init)?;
            }

            let bound = init.bound;
            tracing::debug!(
                service = %service.name,
                siblings = ?bound.keys().collect::<Vec<_>>(),
                "Service initialized"
            );
            if !service.bind_siblings(bound) {
                return Err(ApiError::internal_error(format!(
                    "Service '{}' was already initialized",
                    service.name
                )));
            }
        }

        self.initialized = true;
        tracing::info!(services = self.services.len(), "Service registry initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn get(&self, name: &str) -> ApiResult<Arc<ServiceDefinition>> {
        self.index
            .get(name)
            .and_then(|index| self.services.get(*index))
            .cloned()
            .ok_or_else(|| ApiError::service_not_found(name))
    }

    /// Services in registration order.
    pub fn services(&self) -> &[Arc<ServiceDefinition>] {
        &self.services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Every derived REST binding, in registration order.
    pub fn route_table(&self) -> Vec<RouteEntry> {
        let mut table = Vec::new();
        for service in &self.services {
            for binding in derive_bindings(service) {
                for path in full_paths(service, &binding.path) {
                    table.push(RouteEntry {
                        method: binding.method.as_str(),
                        path,
                        service: service.name.clone(),
                        action: binding.action.clone(),
                    });
                }
            }
        }
        table
    }
}

/// Access to the registry handed to a service's `init` hook.
pub struct ServiceInit<'a> {
    registry: &'a ServiceRegistry,
    bound: HashMap<String, ServiceHandle>,
}

impl ServiceInit<'_> {
    /// Look up a sibling and keep its handle for the service's lifetime.
    pub fn bind(&mut self, name: &str) -> ApiResult<ServiceHandle> {
        if let Some(handle) = self.bound.get(name) {
            return Ok(handle.clone());
        }
        let handle = self.registry.get(name)?.handle();
        self.bound.insert(name.to_string(), handle.clone());
        Ok(handle)
    }
}

/// One line of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub method: &'static str,
    pub path: String,
    pub service: String,
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{handler, ActionDefinition, ActionReply, PopulateRule};
    use inkwell_storage::InMemoryCollection;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(name: &str) -> crate::service::ServiceBuilder {
        ServiceDefinition::builder(name, Arc::new(InMemoryCollection::new(name))).action(
            ActionDefinition::new(
                "find",
                handler(|_ctx| async { Ok(ActionReply::empty()) }),
            ),
        )
    }

    #[test]
    fn test_duplicate_registration_fails() -> ApiResult<()> {
        let mut registry = ServiceRegistry::new();
        registry.register(service("tags").build("salt")?)?;
        let err = registry.register(service("tags").build("salt")?).unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceAlreadyRegistered);
        Ok(())
    }

    #[test]
    fn test_get_unknown_service() {
        let registry = ServiceRegistry::new();
        assert_eq!(
            registry.get("nope").map_err(|e| e.code).unwrap_err(),
            ErrorCode::ServiceNotFound
        );
    }

    #[test]
    fn test_init_runs_once_in_order() -> ApiResult<()> {
        static ORDER: AtomicUsize = AtomicUsize::new(0);
        static SEEN: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];

        let mut registry = ServiceRegistry::new();
        registry.register(service("persons").on_init(|_| {
            SEEN[0].store(ORDER.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            Ok(())
        }).build("salt")?)?;
        registry.register(service("posts").on_init(|init| {
            init.bind("persons")?;
            SEEN[1].store(ORDER.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
            Ok(())
        }).build("salt")?)?;

        registry.init()?;
        registry.init()?;
        assert_eq!(ORDER.load(Ordering::SeqCst), 2);
        assert_eq!(SEEN[0].load(Ordering::SeqCst), 1);
        assert_eq!(SEEN[1].load(Ordering::SeqCst), 2);

        let posts = registry.get("posts")?;
        assert!(posts.sibling("persons").is_ok());
        assert!(posts.sibling("tags").is_err());
        assert!(registry.register(service("late").build("salt")?).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_populate_target_fails_init() -> ApiResult<()> {
        let mut registry = ServiceRegistry::new();
        registry.register(
            service("posts")
                .populate(PopulateRule::by_id("author", "persons"))
                .build("salt")?,
        )?;
        assert_eq!(registry.init().map_err(|e| e.code), Err(ErrorCode::ServiceNotFound));
        Ok(())
    }

    #[test]
    fn test_route_table_lists_versioned_mounts() -> ApiResult<()> {
        let mut registry = ServiceRegistry::new();
        registry.register(service("tags").version(2).build("salt")?)?;
        let table = registry.route_table();
        assert!(table.iter().any(|r| r.method == "GET" && r.path == "/api/tags"));
        assert!(table.iter().any(|r| r.method == "GET" && r.path == "/api/v2/tags"));
        assert!(table.iter().all(|r| r.service == "tags" && r.action == "find"));
        Ok(())
    }
}

//! Route Registrar
//!
//! Derives REST bindings from a service's actions and mounts them.
//!
//! Rules, in precedence order:
//! 1. an explicit mapping binds exactly that route;
//! 2. an atomic action binds `GET`/`POST /:id/{name}`;
//! 3. any other action binds `GET`/`POST /{name}`;
//! 4. `find`, `get`, `create`, `update`, `remove` and `removeAll` also get
//!    their REST-idiomatic routes.
//!
//! Bindings whose last segment is a path parameter are ordered after every
//! other binding of the service, so `/:id` never shadows a named action.
//! When two bindings claim the same method and path the first one wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    body::to_bytes,
    extract::{FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Json, Router,
};
use inkwell_core::AuthUser;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::constants::{API_ROOT, REQUEST_ID_HEADER};
use crate::context::RawRequest;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::ApiError;
use crate::events::Transport;
use crate::service::{Params, ServiceDefinition};

/// Largest accepted JSON body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// HTTP verbs the registrar binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    fn filter(&self) -> MethodFilter {
        match self {
            HttpMethod::Get => MethodFilter::GET,
            HttpMethod::Post => MethodFilter::POST,
            HttpMethod::Put => MethodFilter::PUT,
            HttpMethod::Patch => MethodFilter::PATCH,
            HttpMethod::Delete => MethodFilter::DELETE,
        }
    }
}

/// One derived REST binding, relative to the service mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub method: HttpMethod,
    /// `/`, `/{name}`, `/:id` or `/:id/{name}`.
    pub path: String,
    pub action: String,
    /// Last path segment is a parameter.
    pub terminal_param: bool,
}

impl RouteBinding {
    fn new(method: HttpMethod, path: String, action: &str) -> Self {
        let terminal_param = path
            .rsplit('/')
            .next()
            .is_some_and(|segment| segment.starts_with(':'));
        Self {
            method,
            path,
            action: action.to_string(),
            terminal_param,
        }
    }
}

/// Derive the ordered bindings of a service.
pub fn derive_bindings(service: &ServiceDefinition) -> Vec<RouteBinding> {
    let id = format!("/:{}", service.id_param);
    let mut bindings = Vec::new();

    for action in service.actions() {
        let name = action.name.as_str();

        if let Some(mapping) = &action.mapping {
            bindings.push(RouteBinding::new(mapping.method, mapping.path.clone(), name));
            continue;
        }

        let own_path = if action.is_atomic() {
            format!("{}/{}", id, name)
        } else {
            format!("/{}", name)
        };
        bindings.push(RouteBinding::new(HttpMethod::Get, own_path.clone(), name));
        bindings.push(RouteBinding::new(HttpMethod::Post, own_path, name));

        let idiomatic: &[(HttpMethod, &str)] = match name {
            "find" => &[(HttpMethod::Get, "/")],
            "get" => &[(HttpMethod::Get, "{id}")],
            "create" => &[(HttpMethod::Post, "/"), (HttpMethod::Post, "{id}")],
            "update" => &[
                (HttpMethod::Put, "/"),
                (HttpMethod::Patch, "/"),
                (HttpMethod::Put, "{id}"),
                (HttpMethod::Patch, "{id}"),
            ],
            "remove" => &[(HttpMethod::Delete, "/"), (HttpMethod::Delete, "{id}")],
            "removeAll" => &[(HttpMethod::Delete, "/removeAll"), (HttpMethod::Delete, "/")],
            _ => &[],
        };
        for (method, path) in idiomatic {
            let path = if *path == "{id}" { id.clone() } else { path.to_string() };
            bindings.push(RouteBinding::new(*method, path, name));
        }
    }

    // stable: literal terminals keep declaration order, then the `/:id` family
    let (literal, parameterized): (Vec<_>, Vec<_>) =
        bindings.into_iter().partition(|binding| !binding.terminal_param);

    let mut seen = HashSet::new();
    literal
        .into_iter()
        .chain(parameterized)
        .filter(|binding| seen.insert((binding.method, binding.path.clone())))
        .collect()
}

/// Mount points of a relative path: `/api/{ns}` and, when versioned,
/// `/api/v{version}/{ns}`.
pub fn full_paths(service: &ServiceDefinition, path: &str) -> Vec<String> {
    let suffix = if path == "/" { "" } else { path };
    let mut paths = vec![format!("{}/{}{}", API_ROOT, service.namespace, suffix)];
    if let Some(version) = service.version {
        paths.push(format!("{}/v{}/{}{}", API_ROOT, version, service.namespace, suffix));
    }
    paths
}

/// Build the REST router of one service.
pub fn service_router(service: Arc<ServiceDefinition>, dispatcher: Dispatcher) -> Router {
    let mut order: Vec<String> = Vec::new();
    let mut routes: HashMap<String, MethodRouter> = HashMap::new();

    for binding in derive_bindings(&service) {
        let action = match service.action(&binding.action) {
            Ok(action) => action,
            Err(e) => {
                tracing::error!(service = %service.name, error = %e, "binding without action");
                continue;
            }
        };
        let has_path_params = binding.path.contains(':');

        for path in full_paths(&service, &binding.path) {
            let service = service.clone();
            let action = action.clone();
            let dispatcher = dispatcher.clone();
            let rest_handler = move |request: Request| async move {
                let raw = read_request(request, has_path_params).await;
                let outcome = dispatcher
                    .dispatch_to(Transport::Rest, service, action, raw)
                    .await;
                render(outcome)
            };

            let method_router = match routes.remove(&path) {
                Some(existing) => existing.on(binding.method.filter(), rest_handler),
                None => {
                    order.push(path.clone());
                    MethodRouter::new().on(binding.method.filter(), rest_handler)
                }
            };
            routes.insert(path, method_router);
        }
    }

    order.into_iter().fold(Router::new(), |router, path| match routes.remove(&path) {
        Some(method_router) => router.route(&path, method_router),
        None => router,
    })
}

/// Normalize query string, JSON body and path parameters.
async fn read_request(request: Request, has_path_params: bool) -> RawRequest {
    let (mut parts, body) = request.into_parts();
    let mut raw = RawRequest {
        user: parts.extensions.get::<AuthUser>().cloned(),
        ..RawRequest::default()
    };

    if has_path_params {
        match path_params(&mut parts).await {
            Ok(path) => raw.path = path,
            Err(e) => raw.rejection = Some(e),
        }
    }

    match Query::<HashMap<String, String>>::try_from_uri(&parts.uri) {
        Ok(Query(query)) => {
            raw.query = query
                .into_iter()
                .map(|(k, v)| (k, JsonValue::String(v)))
                .collect();
        }
        Err(e) => {
            raw.rejection.get_or_insert_with(|| ApiError::invalid_input(e.body_text()));
        }
    }

    match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => {}
        Ok(bytes) => match serde_json::from_slice::<JsonValue>(&bytes) {
            Ok(JsonValue::Object(body)) => raw.body = body,
            Ok(_) => {
                raw.rejection.get_or_insert_with(|| {
                    ApiError::invalid_input("Request body must be a JSON object")
                });
            }
            Err(e) => {
                raw.rejection.get_or_insert_with(|| ApiError::from(e));
            }
        },
        Err(e) => {
            raw.rejection
                .get_or_insert_with(|| ApiError::invalid_input(format!("Unreadable body: {}", e)));
        }
    }

    raw
}

async fn path_params(parts: &mut Parts) -> Result<Params, ApiError> {
    let Path(path) = Path::<HashMap<String, String>>::from_request_parts(parts, &())
        .await
        .map_err(|e| ApiError::invalid_input(e.body_text()))?;
    Ok(path
        .into_iter()
        .map(|(k, v)| (k, JsonValue::String(v)))
        .collect())
}

/// `{ data }` or the error envelope, with the correlation id header.
pub fn render(outcome: DispatchOutcome) -> Response {
    let request_id = outcome.request_id.to_string();
    match outcome.result {
        Ok(data) => (
            StatusCode::OK,
            [(REQUEST_ID_HEADER, request_id)],
            Json(serde_json::json!({ "data": data })),
        )
            .into_response(),
        Err(error) => (
            error.status_code(),
            [(REQUEST_ID_HEADER, request_id)],
            Json(error.envelope()),
        )
            .into_response(),
    }
}

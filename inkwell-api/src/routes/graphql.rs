//! GraphQL Transport
//!
//! Each service contributes a [`GraphqlFragment`]: object types, query
//! fields and mutation fields, every field bound to one of the service's
//! actions. The fragments are merged into one dynamic schema at startup;
//! a name collision aborts the merge.
//!
//! Resolvers flatten their arguments into a params map and run through the
//! dispatcher, so permission, cache and population rules match REST.
//!
//! Endpoints:
//! - POST /graphql - Execute queries and mutations
//! - GET /graphql/playground - GraphiQL playground

use std::collections::HashSet;
use std::sync::Arc;

use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, Scalar, Schema, TypeRef,
};
use async_graphql::{ErrorExtensions, Value as GqlValue};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::{get, post},
    Router,
};
use serde_json::Value as JsonValue;

use crate::context::RawRequest;
use crate::dispatcher::Dispatcher;
use crate::error::{ApiError, ApiResult};
use crate::events::Transport;
use crate::middleware::MaybeUser;
use crate::service::{ActionDefinition, Params, ServiceDefinition};

/// Scalar for loosely shaped values (populated references, raw keys).
pub const JSON_SCALAR: &str = "JSON";

/// Scalar for stored timestamps.
pub const TIMESTAMP_SCALAR: &str = "Timestamp";

const QUERY_ROOT: &str = "Query";
const MUTATION_ROOT: &str = "Mutation";

const BUILTIN_TYPES: &[&str] = &[
    "String", "Int", "Float", "Boolean", "ID", JSON_SCALAR, TIMESTAMP_SCALAR, QUERY_ROOT, MUTATION_ROOT,
];

// ============================================================================
// FRAGMENTS
// ============================================================================

/// An object type contributed by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: String,
    /// `(field, type)` pairs; types use SDL notation (`[Tag!]!`).
    pub fields: Vec<(String, String)>,
}

/// A root field bound to an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub type_ref: String,
    pub action: String,
    pub args: Vec<(String, String)>,
}

/// A service's share of the global schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphqlFragment {
    pub types: Vec<TypeDef>,
    pub queries: Vec<FieldDef>,
    pub mutations: Vec<FieldDef>,
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(name, ty)| (name.to_string(), ty.to_string()))
        .collect()
}

impl GraphqlFragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        self.types.push(TypeDef {
            name: name.to_string(),
            fields: pairs(fields),
        });
        self
    }

    pub fn query(mut self, name: &str, type_ref: &str, action: &str, args: &[(&str, &str)]) -> Self {
        self.queries.push(FieldDef {
            name: name.to_string(),
            type_ref: type_ref.to_string(),
            action: action.to_string(),
            args: pairs(args),
        });
        self
    }

    pub fn mutation(mut self, name: &str, type_ref: &str, action: &str, args: &[(&str, &str)]) -> Self {
        self.mutations.push(FieldDef {
            name: name.to_string(),
            type_ref: type_ref.to_string(),
            action: action.to_string(),
            args: pairs(args),
        });
        self
    }
}

/// Parse SDL type notation: `Name`, `Name!`, `[Name]`, `[Name!]!`.
pub fn parse_type_ref(notation: &str) -> ApiResult<TypeRef> {
    let notation = notation.trim();
    if let Some(inner) = notation.strip_suffix('!') {
        return match parse_type_ref(inner)? {
            TypeRef::NonNull(_) => Err(ApiError::invalid_input(format!("Invalid type '{}'", notation))),
            inner => Ok(TypeRef::NonNull(Box::new(inner))),
        };
    }
    if let Some(inner) = notation.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
        return Ok(TypeRef::List(Box::new(parse_type_ref(inner)?)));
    }
    let valid = notation
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && notation.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ApiError::invalid_input(format!("Invalid type '{}'", notation)));
    }
    Ok(TypeRef::named(notation.to_string()))
}

// ============================================================================
// VALUE MAPPING
// ============================================================================

/// Map a JSON result onto the declared output type.
///
/// Object-typed positions carry the JSON object itself; child fields read
/// from it. A value that does not fit its position resolves to null.
fn to_field_value(ty: &TypeRef, value: JsonValue, objects: &HashSet<String>) -> Option<FieldValue<'static>> {
    match ty {
        TypeRef::NonNull(inner) => to_field_value(inner, value, objects),
        TypeRef::List(inner) => match value {
            JsonValue::Array(items) => Some(FieldValue::list(items.into_iter().map(|item| {
                to_field_value(inner, item, objects).unwrap_or(FieldValue::NULL)
            }))),
            _ => None,
        },
        TypeRef::Named(name) => match value {
            JsonValue::Null => None,
            JsonValue::Object(_) if objects.contains(name.as_ref()) => Some(FieldValue::owned_any(value)),
            _ if objects.contains(name.as_ref()) => None,
            scalar => GqlValue::from_json(scalar).ok().map(FieldValue::value),
        },
    }
}

fn gql_error(error: ApiError, request_id: Option<uuid::Uuid>) -> async_graphql::Error {
    async_graphql::Error::new(error.message.clone()).extend_with(|_, extensions| {
        extensions.set("code", error.code.as_str().to_string());
        if let Some(request_id) = request_id {
            extensions.set("requestId", request_id.to_string());
        }
    })
}

// ============================================================================
// SCHEMA ASSEMBLY
// ============================================================================

fn object_type(def: &TypeDef, objects: &Arc<HashSet<String>>) -> ApiResult<Object> {
    let mut object = Object::new(def.name.clone());
    let mut seen = HashSet::new();

    for (field_name, notation) in &def.fields {
        if !seen.insert(field_name.as_str()) {
            return Err(ApiError::schema_conflict(format!(
                "Type '{}' declares field '{}' twice",
                def.name, field_name
            )));
        }
        let ty = parse_type_ref(notation)?;
        let resolved_ty = ty.clone();
        let key = field_name.clone();
        let objects = objects.clone();

        object = object.field(Field::new(field_name.clone(), ty, move |ctx| {
            let value = ctx
                .parent_value
                .try_downcast_ref::<JsonValue>()
                .ok()
                .and_then(|parent| parent.get(&key))
                .cloned()
                .unwrap_or(JsonValue::Null);
            let resolved = to_field_value(&resolved_ty, value, &objects);
            FieldFuture::new(async move { Ok(resolved) })
        }));
    }
    Ok(object)
}

fn action_field(
    def: &FieldDef,
    service: &Arc<ServiceDefinition>,
    action: Arc<ActionDefinition>,
    objects: &Arc<HashSet<String>>,
) -> ApiResult<Field> {
    let ty = parse_type_ref(&def.type_ref)?;
    let resolved_ty = ty.clone();
    let arg_names: Arc<Vec<String>> = Arc::new(def.args.iter().map(|(name, _)| name.clone()).collect());
    let service = service.clone();
    let objects = objects.clone();

    let mut field = Field::new(def.name.clone(), ty, move |ctx: ResolverContext<'_>| {
        let service = service.clone();
        let action = action.clone();
        let arg_names = arg_names.clone();
        let resolved_ty = resolved_ty.clone();
        let objects = objects.clone();

        FieldFuture::new(async move {
            let dispatcher = ctx.data::<Dispatcher>()?;
            let user = ctx.data_opt::<inkwell_core::AuthUser>().cloned();

            let mut params = Params::new();
            for name in arg_names.iter() {
                if let Some(value) = ctx.args.get(name) {
                    let json = value
                        .as_value()
                        .clone()
                        .into_json()
                        .map_err(|e| gql_error(ApiError::from(e), None))?;
                    params.insert(name.clone(), json);
                }
            }

            let raw = RawRequest::with_params(params).user(user);
            let outcome = dispatcher
                .dispatch_to(Transport::Graphql, service, action, raw)
                .await;
            match outcome.result {
                Ok(json) => Ok(to_field_value(&resolved_ty, json, &objects)),
                Err(error) => Err(gql_error(error, Some(outcome.request_id))),
            }
        })
    });

    for (name, notation) in &def.args {
        field = field.argument(InputValue::new(name.clone(), parse_type_ref(notation)?));
    }
    Ok(field)
}

/// Merge every service fragment into one executable schema.
pub fn build_schema(dispatcher: Dispatcher) -> ApiResult<Schema> {
    let registry = dispatcher.registry().clone();

    let mut type_names: HashSet<String> = BUILTIN_TYPES.iter().map(|s| s.to_string()).collect();
    for service in registry.services() {
        let Some(fragment) = &service.graphql else { continue };
        for def in &fragment.types {
            if !type_names.insert(def.name.clone()) {
                return Err(ApiError::schema_conflict(format!(
                    "Type '{}' from service '{}' is already defined",
                    def.name, service.name
                )));
            }
        }
    }
    let objects: Arc<HashSet<String>> = Arc::new(
        registry
            .services()
            .iter()
            .filter_map(|service| service.graphql.as_ref())
            .flat_map(|fragment| fragment.types.iter().map(|def| def.name.clone()))
            .collect(),
    );

    let mut query = Object::new(QUERY_ROOT).field(Field::new("version", TypeRef::named_nn(TypeRef::STRING), |_| {
        FieldFuture::new(async { Ok(Some(FieldValue::value(env!("CARGO_PKG_VERSION").to_string()))) })
    }));
    let mut mutation = Object::new(MUTATION_ROOT);
    let mut query_names: HashSet<String> = HashSet::from(["version".to_string()]);
    let mut mutation_names: HashSet<String> = HashSet::new();
    let mut extra_types = Vec::new();

    for service in registry.services() {
        let Some(fragment) = &service.graphql else { continue };

        for def in &fragment.types {
            extra_types.push(object_type(def, &objects)?);
        }
        for def in &fragment.queries {
            if !query_names.insert(def.name.clone()) {
                return Err(ApiError::schema_conflict(format!(
                    "Query field '{}' from service '{}' is already defined",
                    def.name, service.name
                )));
            }
            query = query.field(action_field(def, service, service.action(&def.action)?, &objects)?);
        }
        for def in &fragment.mutations {
            if !mutation_names.insert(def.name.clone()) {
                return Err(ApiError::schema_conflict(format!(
                    "Mutation field '{}' from service '{}' is already defined",
                    def.name, service.name
                )));
            }
            mutation = mutation.field(action_field(def, service, service.action(&def.action)?, &objects)?);
        }
    }

    let has_mutations = !mutation_names.is_empty();
    let mut builder = Schema::build(QUERY_ROOT, has_mutations.then_some(MUTATION_ROOT), None)
        .register(Scalar::new(JSON_SCALAR).description("Arbitrary JSON value"))
        .register(Scalar::new(TIMESTAMP_SCALAR).description("RFC 3339 timestamp"))
        .register(query);
    if has_mutations {
        builder = builder.register(mutation);
    }
    for object in extra_types {
        builder = builder.register(object);
    }

    tracing::debug!(
        queries = query_names.len(),
        mutations = mutation_names.len(),
        types = objects.len(),
        "GraphQL schema assembled"
    );

    builder
        .data(dispatcher)
        .finish()
        .map_err(|e| ApiError::schema_conflict(e.to_string()))
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Handler for GraphQL requests.
pub async fn graphql_handler(
    State(schema): State<Schema>,
    MaybeUser(user): MaybeUser,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let mut request = req.into_inner();
    if let Some(user) = user {
        request = request.data(user);
    }
    schema.execute(request).await.into()
}

/// Handler for GraphiQL playground.
pub async fn graphiql_handler() -> impl IntoResponse {
    Html(async_graphql::http::GraphiQLSource::build().endpoint("/graphql").finish())
}

/// Create the GraphQL routes router.
pub fn create_router(schema: Schema) -> Router {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/graphql/playground", get(graphiql_handler))
        .with_state(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;
    use crate::cache::ActionCache;
    use crate::config::ApiConfig;
    use crate::registry::ServiceRegistry;
    use crate::service::{handler, ActionReply};
    use inkwell_core::{document_from, Permission};
    use inkwell_storage::InMemoryCollection;
    use serde_json::json;

    fn tags_service(fragment: GraphqlFragment) -> ApiResult<ServiceDefinition> {
        ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
            .permission(Permission::Public)
            .action(ActionDefinition::new(
                "find",
                handler(|_ctx| async {
                    Ok(ActionReply::models(vec![document_from(
                        json!({ "_id": 1, "name": "Rust", "count": 3 }),
                    )]))
                }),
            ))
            .action(
                ActionDefinition::new("purge", handler(|_ctx| async { Ok(ActionReply::json(json!(true))) }))
                    .permission(Permission::Admin),
            )
            .graphql(fragment)
            .build("salt")
    }

    fn dispatcher(services: Vec<ServiceDefinition>) -> ApiResult<Dispatcher> {
        let mut registry = ServiceRegistry::new();
        for service in services {
            registry.register(service)?;
        }
        registry.init()?;
        Ok(Dispatcher::new(
            Arc::new(registry),
            NotificationBus::new(16, ActionCache::default()),
            Arc::new(ApiConfig::default()),
        ))
    }

    fn fragment() -> GraphqlFragment {
        GraphqlFragment::new()
            .object("Tag", &[("code", "ID!"), ("name", "String"), ("count", "Int")])
            .query("tags", "[Tag!]!", "find", &[("limit", "Int")])
            .mutation("purgeTags", "Boolean", "purge", &[])
    }

    #[test]
    fn test_parse_type_ref() -> ApiResult<()> {
        assert_eq!(parse_type_ref("[Tag!]!")?.to_string(), "[Tag!]!");
        assert_eq!(parse_type_ref("Int")?.to_string(), "Int");
        assert!(parse_type_ref("Tag!!").is_err());
        assert!(parse_type_ref("[Tag").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_query_runs_through_dispatcher() -> ApiResult<()> {
        let schema = build_schema(dispatcher(vec![tags_service(fragment())?])?)?;
        let response = schema.execute("{ version tags(limit: 5) { code name count } }").await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json()?;
        assert_eq!(data["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(data["tags"][0]["name"], "Rust");
        assert_eq!(data["tags"][0]["count"], 3);
        assert!(data["tags"][0]["code"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_errors_carry_code_and_request_id() -> ApiResult<()> {
        let schema = build_schema(dispatcher(vec![tags_service(fragment())?])?)?;
        let response = schema.execute("mutation { purgeTags }").await;
        let json = serde_json::to_value(&response)?;
        let extensions = &json["errors"][0]["extensions"];
        assert_eq!(extensions["code"], "UNAUTHORIZED");
        assert!(extensions["requestId"].is_string());
        Ok(())
    }

    #[test]
    fn test_type_collision_aborts() -> ApiResult<()> {
        let other = ServiceDefinition::builder("labels", Arc::new(InMemoryCollection::new("labels")))
            .action(ActionDefinition::new("find", handler(|_ctx| async { Ok(ActionReply::empty()) })))
            .graphql(GraphqlFragment::new().object("Tag", &[("name", "String")]))
            .build("salt")?;
        let result = build_schema(dispatcher(vec![tags_service(fragment())?, other])?);
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.code),
            Err(crate::error::ErrorCode::SchemaConflict)
        );
        Ok(())
    }

    #[test]
    fn test_unknown_action_aborts() -> ApiResult<()> {
        let broken = GraphqlFragment::new().query("tag", "String", "missing", &[]);
        let result = build_schema(dispatcher(vec![tags_service(broken)?])?);
        assert_eq!(
            result.map(|_| ()).map_err(|e| e.code),
            Err(crate::error::ErrorCode::ActionNotFound)
        );
        Ok(())
    }
}

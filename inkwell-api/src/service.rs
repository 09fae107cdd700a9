//! Service and Action Definitions
//!
//! A service is a fixed record: its name and mount namespace, a default
//! permission level, a collection handle, an ordered list of actions, an
//! output allow-list and a population map. Actions are fixed records too:
//! permission override, cache scope, the `is_atomic` path-shape flag, an
//! optional explicit route, and the handler.
//!
//! Handlers are plain async functions of a [`Context`]; they talk to their
//! own collection through the context and to sibling services through the
//! handles bound during `init`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};

use futures_util::future::BoxFuture;
use inkwell_core::{doc_id, AuthUser, DocId, Document, Filter, IdCodec, Permission, ID_FIELD};
use inkwell_storage::{Collection, Query};
use serde_json::Value as JsonValue;

use crate::cache::CacheScope;
use crate::constants::DEFAULT_ID_PARAM;
use crate::context::Context;
use crate::error::{ApiError, ApiResult};
use crate::events::ChangeVerb;
use crate::registry::ServiceInit;
use crate::routes::graphql::GraphqlFragment;
use crate::routes::registrar::HttpMethod;

/// Normalized request parameters.
pub type Params = serde_json::Map<String, JsonValue>;

/// Action handler: a pure function of the request context.
pub type ActionHandler = Arc<dyn Fn(Context) -> BoxFuture<'static, ApiResult<ActionReply>> + Send + Sync>;

/// Ownership predicate evaluated for `OWNER` actions.
pub type OwnerChecker = Arc<dyn Fn(&Context, &AuthUser) -> bool + Send + Sync>;

/// One-time `init` hook.
pub type InitHook = Arc<dyn Fn(&mut ServiceInit<'_>) -> ApiResult<()> + Send + Sync>;

/// Runs once per new socket connection; returns frames to send.
pub type ConnectionHook = Arc<dyn Fn(Option<&AuthUser>) -> Vec<JsonValue> + Send + Sync>;

/// Wrap an async function as an [`ActionHandler`].
pub fn handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResult<ActionReply>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

// ============================================================================
// ACTION RESULTS
// ============================================================================

/// What a handler produced, before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// One stored document; filtered and populated on the way out.
    Model(Document),
    /// Several stored documents; filtered and populated on the way out.
    Models(Vec<Document>),
    /// Already-shaped JSON, sent as is.
    Json(JsonValue),
    Empty,
}

/// Handler result: a payload plus an optional change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReply {
    pub payload: Payload,
    pub notify: Option<ChangeVerb>,
}

impl ActionReply {
    pub fn model(doc: Document) -> Self {
        Self {
            payload: Payload::Model(doc),
            notify: None,
        }
    }

    pub fn models(docs: Vec<Document>) -> Self {
        Self {
            payload: Payload::Models(docs),
            notify: None,
        }
    }

    pub fn json(value: JsonValue) -> Self {
        Self {
            payload: Payload::Json(value),
            notify: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            payload: Payload::Empty,
            notify: None,
        }
    }

    /// Publish `verb` with the serialized payload once the action succeeds.
    pub fn notify(mut self, verb: ChangeVerb) -> Self {
        self.notify = Some(verb);
        self
    }
}

// ============================================================================
// ACTION DEFINITION
// ============================================================================

/// Explicit transport mapping for an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionMapping {
    pub method: HttpMethod,
    /// Path relative to the service mount, e.g. `/` or `/:id`.
    pub path: String,
}

/// One named operation of a service.
#[derive(Clone)]
pub struct ActionDefinition {
    pub name: String,
    /// Overrides the service default when set.
    pub permission: Option<Permission>,
    pub cache: Option<CacheScope>,
    is_atomic: bool,
    pub mapping: Option<ActionMapping>,
    pub handler: ActionHandler,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, handler: ActionHandler) -> Self {
        Self {
            name: name.into(),
            permission: None,
            cache: None,
            is_atomic: false,
            mapping: None,
            handler,
        }
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Cache results shared between callers.
    pub fn cached(mut self) -> Self {
        self.cache = Some(CacheScope::Shared);
        self
    }

    /// Cache results per caller.
    pub fn cached_per_user(mut self) -> Self {
        self.cache = Some(CacheScope::PerUser);
        self
    }

    /// Address the action as `/{id}/{name}`.
    pub fn atomic(mut self) -> Self {
        self.is_atomic = true;
        self
    }

    pub fn mapping(mut self, method: HttpMethod, path: impl Into<String>) -> Self {
        self.mapping = Some(ActionMapping {
            method,
            path: path.into(),
        });
        self
    }

    pub fn is_atomic(&self) -> bool {
        self.is_atomic
    }
}

impl fmt::Debug for ActionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDefinition")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .field("cache", &self.cache)
            .field("is_atomic", &self.is_atomic)
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// POPULATION MAP
// ============================================================================

/// How a populated field references the sibling's entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PopulateMode {
    /// The field holds internal keys of the sibling (scalar or array).
    ById,
    /// The field holds external keys; tried against each key field in order.
    ByFilter { keys: Vec<String> },
}

/// Field → sibling service join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateRule {
    pub field: String,
    pub service: String,
    pub mode: PopulateMode,
}

impl PopulateRule {
    pub fn by_id(field: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            service: service.into(),
            mode: PopulateMode::ById,
        }
    }

    pub fn by_filter(field: impl Into<String>, service: impl Into<String>, keys: &[&str]) -> Self {
        Self {
            field: field.into(),
            service: service.into(),
            mode: PopulateMode::ByFilter {
                keys: keys.iter().map(|k| k.to_string()).collect(),
            },
        }
    }
}

// ============================================================================
// SERIALIZATION
// ============================================================================

/// Shape a stored document for the outside world.
///
/// The internal key never leaves: `_id` is dropped and the opaque `code`
/// takes its place. With an allow-list only the listed fields survive
/// (`code` included only when listed).
pub fn document_to_json(
    doc: &Document,
    codec: &IdCodec,
    property_filter: Option<&[String]>,
) -> JsonValue {
    let code = doc_id(doc).map(|id| JsonValue::String(codec.encode(id)));
    let mut out = serde_json::Map::new();

    match property_filter {
        Some(fields) => {
            for field in fields {
                if field == "code" {
                    if let Some(code) = &code {
                        out.insert("code".to_string(), code.clone());
                    }
                } else if field != ID_FIELD {
                    if let Some(value) = doc.get(field) {
                        out.insert(field.clone(), value.clone());
                    }
                }
            }
        }
        None => {
            if let Some(code) = &code {
                out.insert("code".to_string(), code.clone());
            }
            for (field, value) in doc {
                if field != ID_FIELD && field != "code" {
                    out.insert(field.clone(), value.clone());
                }
            }
        }
    }

    JsonValue::Object(out)
}

// ============================================================================
// SERVICE HANDLE
// ============================================================================

/// Typed handle to a sibling service, handed out during `init`.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub name: String,
    collection: Arc<dyn Collection>,
    codec: IdCodec,
    property_filter: Option<Vec<String>>,
}

impl ServiceHandle {
    pub fn decode_id(&self, code: &str) -> ApiResult<DocId> {
        Ok(self.codec.decode(code)?)
    }

    pub fn encode_id(&self, id: DocId) -> String {
        self.codec.encode(id)
    }

    pub fn to_json(&self, doc: &Document) -> JsonValue {
        document_to_json(doc, &self.codec, self.property_filter.as_deref())
    }

    /// Serialized entity by internal key.
    pub async fn get_by_id(&self, id: DocId) -> ApiResult<Option<JsonValue>> {
        Ok(self
            .collection
            .find_by_id(id)
            .await?
            .map(|doc| self.to_json(&doc)))
    }

    /// Serialized entities by internal key, in the order given.
    pub async fn get_by_ids(&self, ids: &[DocId]) -> ApiResult<Vec<JsonValue>> {
        let docs = self.collection.find_by_ids(ids).await?;
        Ok(docs.iter().map(|doc| self.to_json(doc)).collect())
    }

    /// Serialized entities whose `key` is one of `ids`.
    pub async fn find_by_filter(&self, key: &str, ids: &[JsonValue]) -> ApiResult<Vec<JsonValue>> {
        let query = Query::filtered(Filter::is_in(key, ids.to_vec()));
        let docs = self.collection.find(&query).await?;
        Ok(docs.iter().map(|doc| self.to_json(doc)).collect())
    }
}

// ============================================================================
// SERVICE DEFINITION
// ============================================================================

/// A registered service.
pub struct ServiceDefinition {
    pub name: String,
    pub namespace: String,
    pub version: Option<u32>,
    /// Default permission for actions that declare none.
    pub permission: Permission,
    pub collection: Arc<dyn Collection>,
    pub codec: IdCodec,
    /// Name of the path/body parameter carrying an entity code.
    pub id_param: String,
    actions: Vec<Arc<ActionDefinition>>,
    pub property_filter: Option<Vec<String>>,
    pub populates: Vec<PopulateRule>,
    owner_checker: Option<OwnerChecker>,
    init_hook: Option<InitHook>,
    after_connection: Option<ConnectionHook>,
    pub graphql: Option<GraphqlFragment>,
    siblings: OnceLock<HashMap<String, ServiceHandle>>,
}

impl ServiceDefinition {
    pub fn builder(name: impl Into<String>, collection: Arc<dyn Collection>) -> ServiceBuilder {
        let name = name.into();
        ServiceBuilder {
            namespace: name.clone(),
            name,
            version: None,
            permission: Permission::LoggedIn,
            collection,
            id_param: DEFAULT_ID_PARAM.to_string(),
            actions: Vec::new(),
            property_filter: None,
            populates: Vec::new(),
            owner_checker: None,
            init_hook: None,
            after_connection: None,
            graphql: None,
        }
    }

    /// Actions in declaration order.
    pub fn actions(&self) -> &[Arc<ActionDefinition>] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> ApiResult<Arc<ActionDefinition>> {
        self.actions
            .iter()
            .find(|action| action.name == name)
            .cloned()
            .ok_or_else(|| ApiError::action_not_found(&self.name, name))
    }

    /// Effective permission of an action.
    pub fn permission_of(&self, action: &ActionDefinition) -> Permission {
        action.permission.unwrap_or(self.permission)
    }

    pub fn to_json(&self, doc: &Document) -> JsonValue {
        document_to_json(doc, &self.codec, self.property_filter.as_deref())
    }

    /// Handle for siblings (and for this service's own lookups).
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            name: self.name.clone(),
            collection: self.collection.clone(),
            codec: self.codec.clone(),
            property_filter: self.property_filter.clone(),
        }
    }

    /// Sibling bound during `init`.
    pub fn sibling(&self, name: &str) -> ApiResult<&ServiceHandle> {
        self.siblings
            .get()
            .and_then(|siblings| siblings.get(name))
            .ok_or_else(|| {
                tracing::error!(service = %self.name, sibling = name, "sibling not bound during init");
                ApiError::service_not_found(name)
            })
    }

    pub(crate) fn init_hook(&self) -> Option<&InitHook> {
        self.init_hook.as_ref()
    }

    pub(crate) fn bind_siblings(&self, siblings: HashMap<String, ServiceHandle>) -> bool {
        self.siblings.set(siblings).is_ok()
    }

    /// Evaluate the ownership predicate (default: author match or admin).
    pub fn is_owner(&self, ctx: &Context, user: &AuthUser) -> bool {
        match &self.owner_checker {
            Some(checker) => checker(ctx, user),
            None => default_owner_check(ctx, user),
        }
    }

    /// Greeting frames for a new socket connection.
    pub fn after_connection(&self, user: Option<&AuthUser>) -> Vec<JsonValue> {
        self.after_connection
            .as_ref()
            .map(|hook| hook(user))
            .unwrap_or_default()
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("version", &self.version)
            .field("permission", &self.permission)
            .field("actions", &self.actions)
            .field("populates", &self.populates)
            .finish_non_exhaustive()
    }
}

/// Resolved model's `author` equals the caller, or the caller is an admin.
pub fn default_owner_check(ctx: &Context, user: &AuthUser) -> bool {
    if user.is_admin() {
        return true;
    }
    ctx.model
        .as_ref()
        .and_then(|model| model.get("author"))
        .and_then(JsonValue::as_i64)
        .is_some_and(|author| author == user.id)
}

/// Builder for [`ServiceDefinition`].
pub struct ServiceBuilder {
    name: String,
    namespace: String,
    version: Option<u32>,
    permission: Permission,
    collection: Arc<dyn Collection>,
    id_param: String,
    actions: Vec<ActionDefinition>,
    property_filter: Option<Vec<String>>,
    populates: Vec<PopulateRule>,
    owner_checker: Option<OwnerChecker>,
    init_hook: Option<InitHook>,
    after_connection: Option<ConnectionHook>,
    graphql: Option<GraphqlFragment>,
}

impl ServiceBuilder {
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    pub fn id_param(mut self, id_param: impl Into<String>) -> Self {
        self.id_param = id_param.into();
        self
    }

    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.actions.push(action);
        self
    }

    /// Space-separated allow-list of output fields.
    pub fn property_filter(mut self, fields: &str) -> Self {
        self.property_filter = Some(fields.split_whitespace().map(str::to_string).collect());
        self
    }

    pub fn populate(mut self, rule: PopulateRule) -> Self {
        self.populates.push(rule);
        self
    }

    pub fn owner_checker<F>(mut self, checker: F) -> Self
    where
        F: Fn(&Context, &AuthUser) -> bool + Send + Sync + 'static,
    {
        self.owner_checker = Some(Arc::new(checker));
        self
    }

    pub fn on_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ServiceInit<'_>) -> ApiResult<()> + Send + Sync + 'static,
    {
        self.init_hook = Some(Arc::new(hook));
        self
    }

    pub fn after_connection<F>(mut self, hook: F) -> Self
    where
        F: Fn(Option<&AuthUser>) -> Vec<JsonValue> + Send + Sync + 'static,
    {
        self.after_connection = Some(Arc::new(hook));
        self
    }

    pub fn graphql(mut self, fragment: GraphqlFragment) -> Self {
        self.graphql = Some(fragment);
        self
    }

    /// Finish the definition. `salt` keys the service's opaque-id codec.
    ///
    /// Names are cache-key prefixes, so they must be non-empty and free of
    /// `:`.
    pub fn build(self, salt: &str) -> ApiResult<ServiceDefinition> {
        if self.name.is_empty() || self.name.contains(':') {
            return Err(ApiError::invalid_input(format!(
                "Invalid service name '{}': must be non-empty and must not contain ':'",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for action in &self.actions {
            if !seen.insert(action.name.as_str()) {
                return Err(ApiError::invalid_input(format!(
                    "Service '{}' declares action '{}' twice",
                    self.name, action.name
                )));
            }
        }

        Ok(ServiceDefinition {
            codec: IdCodec::new(salt, &self.name),
            name: self.name,
            namespace: self.namespace,
            version: self.version,
            permission: self.permission,
            collection: self.collection,
            id_param: self.id_param,
            actions: self.actions.into_iter().map(Arc::new).collect(),
            property_filter: self.property_filter,
            populates: self.populates,
            owner_checker: self.owner_checker,
            init_hook: self.init_hook,
            after_connection: self.after_connection,
            graphql: self.graphql,
            siblings: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell_core::document_from;
    use inkwell_storage::InMemoryCollection;
    use serde_json::json;

    fn noop() -> ActionHandler {
        handler(|_ctx: Context| async { Ok(ActionReply::empty()) })
    }

    #[test]
    fn test_to_json_hides_internal_key() {
        let codec = IdCodec::new("salt", "tags");
        let doc = document_from(json!({ "_id": 3, "name": "Rust", "tag_id": "rust" }));

        let open = document_to_json(&doc, &codec, None);
        assert!(open.get("_id").is_none());
        assert_eq!(open["code"], json!(codec.encode(3)));
        assert_eq!(open["name"], "Rust");

        let filter = vec!["name".to_string(), "_id".to_string()];
        let filtered = document_to_json(&doc, &codec, Some(&filter));
        assert_eq!(filtered, json!({ "name": "Rust" }));
    }

    #[test]
    fn test_duplicate_actions_rejected() {
        let result = ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
            .action(ActionDefinition::new("find", noop()))
            .action(ActionDefinition::new("find", noop()))
            .build("salt");
        assert!(result.is_err());
    }

    #[test]
    fn test_service_names_cannot_shadow_cache_prefixes() {
        for name in ["blog:posts", ""] {
            let result = ServiceDefinition::builder(name, Arc::new(InMemoryCollection::new("posts")))
                .action(ActionDefinition::new("find", noop()))
                .build("salt");
            assert_eq!(result.map(|_| ()).map_err(|e| e.code), Err(crate::error::ErrorCode::InvalidInput));
        }
    }

    #[test]
    fn test_permission_fallback() -> ApiResult<()> {
        let service = ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
            .permission(Permission::LoggedIn)
            .action(ActionDefinition::new("find", noop()).permission(Permission::Public))
            .action(ActionDefinition::new("create", noop()))
            .build("salt")?;

        assert_eq!(service.permission_of(&*service.action("find")?), Permission::Public);
        assert_eq!(service.permission_of(&*service.action("create")?), Permission::LoggedIn);
        assert!(service.action("vote").is_err());
        assert_eq!(service.namespace, "tags");
        Ok(())
    }

    #[test]
    fn test_property_filter_parsing() -> ApiResult<()> {
        let service = ServiceDefinition::builder("tags", Arc::new(InMemoryCollection::new("tags")))
            .property_filter("name  tag_id")
            .build("salt")?;
        assert_eq!(
            service.property_filter,
            Some(vec!["name".to_string(), "tag_id".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_atomic_flag() {
        let action = ActionDefinition::new("vote", noop()).atomic().cached();
        assert!(action.is_atomic());
        assert_eq!(action.cache, Some(CacheScope::Shared));
    }
}

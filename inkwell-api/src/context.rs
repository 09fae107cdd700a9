//! Request Context
//!
//! One uniform request/response unit per inbound call, whatever transport
//! it came from. Handlers read parameters, the caller and the resolved
//! model from here, and use the helpers for permission checks, paging and
//! parameter validation.

use std::sync::Arc;

use inkwell_core::{AuthUser, DocId, Document, Permission, SortKey, ValidationError};
use inkwell_storage::{Collection, Query};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::events::Transport;
use crate::service::{ActionDefinition, Params, ServiceDefinition, ServiceHandle};

/// Raw transport input, before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub query: Params,
    pub body: Params,
    pub path: Params,
    pub user: Option<AuthUser>,
    /// Set when the transport could not decode the request; surfaced as the
    /// request's failure inside the dispatcher's boundary.
    pub rejection: Option<ApiError>,
}

impl RawRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request whose parameters arrive as one map (socket frames, GraphQL
    /// arguments).
    pub fn with_params(params: Params) -> Self {
        Self {
            body: params,
            ..Self::default()
        }
    }

    pub fn user(mut self, user: Option<AuthUser>) -> Self {
        self.user = user;
        self
    }
}

/// Per-request context.
#[derive(Debug, Clone)]
pub struct Context {
    /// Correlation id (UUID v7).
    pub id: Uuid,
    pub transport: Transport,
    pub service: Arc<ServiceDefinition>,
    pub action: Arc<ActionDefinition>,
    /// Merged parameters: query < body < path.
    pub params: Params,
    pub user: Option<AuthUser>,
    pub model: Option<Document>,
    pub model_id: Option<DocId>,
    pub validation_errors: Vec<ValidationError>,
    config: Arc<ApiConfig>,
    rejection: Option<ApiError>,
}

impl Context {
    /// Build a context, normalizing every parameter source into one map.
    pub fn from_request(
        transport: Transport,
        service: Arc<ServiceDefinition>,
        action: Arc<ActionDefinition>,
        raw: RawRequest,
        config: Arc<ApiConfig>,
    ) -> Self {
        let RawRequest {
            query,
            body,
            path,
            user,
            rejection,
        } = raw;

        let mut params = query;
        params.extend(body);
        params.extend(path);

        Self {
            id: Uuid::now_v7(),
            transport,
            service,
            action,
            params,
            user,
            model: None,
            model_id: None,
            validation_errors: Vec::new(),
            config,
            rejection,
        }
    }

    pub(crate) fn take_rejection(&mut self) -> Option<ApiError> {
        self.rejection.take()
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.params.get(name).filter(|value| !value.is_null())
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.param(name).is_some()
    }

    /// String parameter; numbers and booleans are not coerced.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(JsonValue::as_str)
    }

    /// Non-negative integer parameter, accepting numeric strings.
    pub fn param_usize(&self, name: &str) -> Option<usize> {
        match self.param(name)? {
            JsonValue::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    // ========================================================================
    // Model resolution
    // ========================================================================

    /// Entity code supplied by the caller (id parameter, then `code`).
    pub fn code_param(&self) -> Option<&str> {
        self.param_str(&self.service.id_param)
            .or_else(|| self.param_str("code"))
    }

    /// Decode the supplied code and load the model.
    ///
    /// A missing or undecodable code, or a missing document, leaves the
    /// model unset; only [`Context::assert_model_exists`] turns that into a
    /// failure. Store errors propagate.
    pub async fn resolve_model(&mut self) -> ApiResult<()> {
        let Some(code) = self.code_param() else {
            return Ok(());
        };

        let id = match self.service.codec.decode(code) {
            Ok(id) => id,
            Err(e) => {
                tracing::debug!(service = %self.service.name, error = %e, "unresolvable entity code");
                return Ok(());
            }
        };

        self.model = self.service.collection.find_by_id(id).await?;
        if self.model.is_some() {
            self.model_id = Some(id);
        }
        Ok(())
    }

    pub fn assert_model_exists(&self, message: &str) -> ApiResult<&Document> {
        self.model
            .as_ref()
            .ok_or_else(|| ApiError::model_not_found(message))
    }

    /// Internal key of the resolved model.
    pub fn require_model_id(&self, message: &str) -> ApiResult<DocId> {
        self.assert_model_exists(message)?;
        self.model_id.ok_or_else(|| ApiError::model_not_found(message))
    }

    // ========================================================================
    // Permissions
    // ========================================================================

    pub fn permission(&self) -> Permission {
        self.service.permission_of(&self.action)
    }

    /// Evaluate the action's permission level against the caller.
    pub fn check_permission(&self) -> ApiResult<()> {
        match self.permission() {
            Permission::Public => Ok(()),
            Permission::LoggedIn => self.require_user().map(|_| ()),
            Permission::Admin => {
                let user = self.require_user()?;
                if user.is_admin() {
                    Ok(())
                } else {
                    Err(ApiError::forbidden("Administrator role required"))
                }
            }
            Permission::Owner => {
                let user = self.require_user()?;
                self.assert_model_exists("Model not found")?;
                if self.service.is_owner(self, user) {
                    Ok(())
                } else {
                    Err(ApiError::forbidden("Only the owner can do this"))
                }
            }
        }
    }

    pub fn require_user(&self) -> ApiResult<&AuthUser> {
        self.user
            .as_ref()
            .ok_or_else(|| ApiError::from_code(ErrorCode::Unauthorized))
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(AuthUser::is_admin)
    }

    // ========================================================================
    // Paging and sorting
    // ========================================================================

    /// Apply `limit`, `offset`/`skip` and `sort` to an unexecuted query.
    ///
    /// The limit falls back to the configured default and is clamped to the
    /// configured maximum. A `sort` parameter replaces the query's sort.
    pub fn query_page_sort(&self, query: Query) -> Query {
        let limit = self.config.clamp_page_size(self.param_usize("limit"));
        let mut query = query.limit(limit);

        if let Some(offset) = self.param_usize("offset").or_else(|| self.param_usize("skip")) {
            query = query.skip(offset);
        }

        if let Some(sort) = self.param_str("sort") {
            let keys = SortKey::parse_list(sort);
            if !keys.is_empty() {
                query = query.sort(keys);
            }
        }

        query
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Start validating one parameter.
    pub fn validate_param(&mut self, name: &str) -> ParamValidator<'_> {
        ParamValidator {
            ctx: self,
            name: name.to_string(),
            failed: false,
        }
    }

    pub fn has_validation_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }

    /// Structured validation failure carrying the accumulated errors.
    pub fn error_bad_request(&self, code: ErrorCode, message: impl Into<String>) -> ApiError {
        let error = ApiError::new(code, message);
        if self.validation_errors.is_empty() {
            error
        } else {
            error.with_details(serde_json::json!(self.validation_errors))
        }
    }

    // ========================================================================
    // Stores and siblings
    // ========================================================================

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.service.collection
    }

    pub fn sibling(&self, name: &str) -> ApiResult<&ServiceHandle> {
        self.service.sibling(name)
    }

    /// Serialize a document through this service's allow-list.
    pub fn to_json(&self, doc: &Document) -> JsonValue {
        self.service.to_json(doc)
    }
}

/// Fluent validator for one parameter. Only the first failure per
/// parameter is recorded.
pub struct ParamValidator<'a> {
    ctx: &'a mut Context,
    name: String,
    failed: bool,
}

impl ParamValidator<'_> {
    fn fail(&mut self, message: &str) {
        if !self.failed {
            self.failed = true;
            self.ctx
                .validation_errors
                .push(ValidationError::new(self.name.clone(), message));
        }
    }

    /// Trim surrounding whitespace of a string parameter in place.
    pub fn trim(self) -> Self {
        if let Some(JsonValue::String(s)) = self.ctx.params.get_mut(&self.name) {
            let trimmed = s.trim();
            if trimmed.len() != s.len() {
                *s = trimmed.to_string();
            }
        }
        self
    }

    pub fn not_empty(mut self, message: &str) -> Self {
        let empty = match self.ctx.params.get(&self.name) {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::String(s)) => s.is_empty(),
            Some(JsonValue::Array(items)) => items.is_empty(),
            Some(_) => false,
        };
        if empty {
            self.fail(message);
        }
        self
    }

    /// Number, or a string that parses as one. Absent parameters pass.
    pub fn is_number(mut self, message: &str) -> Self {
        let ok = match self.ctx.params.get(&self.name) {
            None | Some(JsonValue::Null) | Some(JsonValue::Number(_)) => true,
            Some(JsonValue::String(s)) => s.trim().parse::<f64>().is_ok(),
            Some(_) => false,
        };
        if !ok {
            self.fail(message);
        }
        self
    }

    /// String type check. Absent parameters pass.
    pub fn is_string(mut self, message: &str) -> Self {
        let ok = matches!(
            self.ctx.params.get(&self.name),
            None | Some(JsonValue::Null) | Some(JsonValue::String(_))
        );
        if !ok {
            self.fail(message);
        }
        self
    }

    /// Finish; returns whether this parameter passed.
    pub fn end(self) -> bool {
        !self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{handler, ActionReply};
    use inkwell_core::document_from;
    use inkwell_storage::InMemoryCollection;
    use serde_json::json;

    fn service(permission: Permission) -> ApiResult<Arc<ServiceDefinition>> {
        let action = ActionDefinition::new(
            "update",
            handler(|_ctx: Context| async { Ok(ActionReply::empty()) }),
        )
        .permission(permission);
        Ok(Arc::new(
            ServiceDefinition::builder("posts", Arc::new(InMemoryCollection::new("posts")))
                .action(action)
                .build("salt")?,
        ))
    }

    fn context(service: Arc<ServiceDefinition>, raw: RawRequest) -> ApiResult<Context> {
        let action = service.action("update")?;
        Ok(Context::from_request(
            Transport::Rest,
            service,
            action,
            raw,
            Arc::new(ApiConfig::default()),
        ))
    }

    fn params(value: JsonValue) -> Params {
        document_from(value)
    }

    #[test]
    fn test_param_precedence() -> ApiResult<()> {
        let raw = RawRequest {
            query: params(json!({"id": "q", "limit": "5"})),
            body: params(json!({"id": "b", "title": "t"})),
            path: params(json!({"id": "p"})),
            ..RawRequest::default()
        };
        let ctx = context(service(Permission::Public)?, raw)?;
        assert_eq!(ctx.param_str("id"), Some("p"));
        assert_eq!(ctx.param_usize("limit"), Some(5));
        assert_eq!(ctx.param_str("title"), Some("t"));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_model() -> ApiResult<()> {
        let service = service(Permission::Public)?;
        let stored = service
            .collection
            .insert(document_from(json!({"title": "Hello", "author": 1})))
            .await?;
        let id = inkwell_core::doc_id(&stored).ok_or_else(|| ApiError::internal_error("no id"))?;

        let raw = RawRequest::with_params(params(json!({"code": service.codec.encode(id)})));
        let mut ctx = context(service.clone(), raw)?;
        ctx.resolve_model().await?;
        assert_eq!(ctx.model_id, Some(id));

        let raw = RawRequest::with_params(params(json!({"id": "garbage!"})));
        let mut ctx = context(service, raw)?;
        ctx.resolve_model().await?;
        assert!(ctx.model.is_none());
        assert_eq!(
            ctx.assert_model_exists("gone").map(|_| ()),
            Err(ApiError::model_not_found("gone"))
        );
        Ok(())
    }

    #[test]
    fn test_logged_in_requires_user() -> ApiResult<()> {
        let ctx = context(service(Permission::LoggedIn)?, RawRequest::new())?;
        assert_eq!(ctx.check_permission().map_err(|e| e.code), Err(ErrorCode::Unauthorized));

        let raw = RawRequest::new().user(Some(AuthUser::new(1, "u1", "alice")));
        let ctx = context(service(Permission::LoggedIn)?, raw)?;
        assert!(ctx.check_permission().is_ok());
        Ok(())
    }

    #[test]
    fn test_owner_check() -> ApiResult<()> {
        let alice = AuthUser::new(1, "u1", "alice");
        let bob = AuthUser::new(2, "u2", "bob");

        let mut ctx = context(service(Permission::Owner)?, RawRequest::new().user(Some(bob.clone())))?;
        assert_eq!(ctx.check_permission().map_err(|e| e.code), Err(ErrorCode::ModelNotFound));

        ctx.model = Some(document_from(json!({"_id": 9, "author": alice.id})));
        assert_eq!(ctx.check_permission().map_err(|e| e.code), Err(ErrorCode::Forbidden));

        ctx.user = Some(alice);
        assert!(ctx.check_permission().is_ok());

        ctx.user = Some(bob.with_role(inkwell_core::ADMIN_ROLE));
        assert!(ctx.check_permission().is_ok());
        Ok(())
    }

    #[test]
    fn test_admin_permission() -> ApiResult<()> {
        let raw = RawRequest::new().user(Some(AuthUser::new(1, "u1", "alice")));
        let ctx = context(service(Permission::Admin)?, raw)?;
        assert_eq!(ctx.check_permission().map_err(|e| e.code), Err(ErrorCode::Forbidden));
        Ok(())
    }

    #[test]
    fn test_query_page_sort() -> ApiResult<()> {
        let raw = RawRequest::with_params(params(json!({"limit": 500, "skip": "20", "sort": "-votes"})));
        let ctx = context(service(Permission::Public)?, raw)?;
        let query = ctx.query_page_sort(Query::new().sort(vec![SortKey::desc("createdAt")]));
        assert_eq!(query.limit, Some(100));
        assert_eq!(query.skip, 20);
        assert_eq!(query.sort, vec![SortKey::desc("votes")]);

        let ctx = context(service(Permission::Public)?, RawRequest::new())?;
        let query = ctx.query_page_sort(Query::new().sort(vec![SortKey::desc("createdAt")]));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.sort, vec![SortKey::desc("createdAt")]);
        Ok(())
    }

    #[test]
    fn test_validation_accumulates() -> ApiResult<()> {
        let raw = RawRequest::with_params(params(json!({"title": "  ", "content": " body ", "views": "x"})));
        let mut ctx = context(service(Permission::Public)?, raw)?;

        assert!(!ctx.validate_param("title").trim().not_empty("Title cannot be empty").end());
        assert!(ctx.validate_param("content").trim().not_empty("Content cannot be empty").end());
        assert!(!ctx.validate_param("views").is_number("Views must be a number").end());
        assert!(!ctx.validate_param("missing").not_empty("Required").not_empty("twice").end());

        assert_eq!(ctx.param_str("content"), Some("body"));
        assert!(ctx.has_validation_errors());
        assert_eq!(ctx.validation_errors.len(), 3);

        let err = ctx.error_bad_request(ErrorCode::ValidationFailed, "Invalid parameters");
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details.as_ref().map(|d| d[0]["param"].clone()), Some(json!("title")));
        Ok(())
    }
}

//! Axum Middleware for Authentication
//!
//! `try_authenticate` resolves the caller from the `X-API-Key` or
//! `Authorization: Bearer` header and stores the [`AuthUser`] in the
//! request extensions. It never rejects: a request without credentials, or
//! with credentials that do not check out, continues anonymously and the
//! per-action permission check decides.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use inkwell_core::AuthUser;

use crate::auth::{extract_credential, resolve_user, AuthConfig};
use crate::constants::API_KEY_HEADER;
use crate::service::ServiceHandle;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
    /// Handle to the service whose codes identify callers.
    pub persons: ServiceHandle,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: AuthConfig, persons: ServiceHandle) -> Self {
        Self {
            auth_config: Arc::new(auth_config),
            persons,
        }
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Resolve the caller, if any, and continue.
pub async fn try_authenticate(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Response {
    let api_key_header = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok());
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let user = match extract_credential(&state.auth_config, api_key_header, auth_header) {
        Ok(Some(credential)) => match resolve_user(credential, &state.persons).await {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(code = %e.code, error = %e.message, "credential rejected, continuing anonymously");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(code = %e.code, error = %e.message, "credential rejected, continuing anonymously");
            None
        }
    };

    if let Some(user) = user {
        tracing::debug!(user = %user.code, username = %user.username, "caller authenticated");
        request.extensions_mut().insert(user);
    }

    next.run(request).await
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// The caller resolved by [`try_authenticate`], if any.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<AuthUser>().cloned()))
    }
}

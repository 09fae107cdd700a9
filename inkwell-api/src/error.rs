//! Error Types for the Inkwell API
//!
//! This module defines error handling for the dispatch core, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for machine-readable codes
//! - ErrorKind for the failure taxonomy every code belongs to
//!
//! REST renders errors as `{ "error": { code, message, details? } }`; the
//! WebSocket and GraphQL transports carry the same object.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use inkwell_core::{CodecError, InkwellError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR KIND
// ============================================================================

/// Failure taxonomy shared by all transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad or missing input
    Validation,
    /// Model resolution or lookup failed
    NotFound,
    /// Permission level or ownership check failed
    Permission,
    /// Action-specific business rule violated
    DomainConflict,
    /// Unexpected store or sibling-service failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Permission => "permission",
            ErrorKind::DomainConflict => "domain_conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// One or more parameters failed validation
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// The context has no resolved model
    ModelNotFound,

    /// Requested entity does not exist
    EntityNotFound,

    /// No service registered under that name
    ServiceNotFound,

    /// Service has no action with that name
    ActionNotFound,

    // ========================================================================
    // Permission Errors (401, 403)
    // ========================================================================
    /// Caller must be logged in
    Unauthorized,

    /// Caller is authenticated but not allowed
    Forbidden,

    /// Authentication token is invalid or malformed
    InvalidToken,

    // ========================================================================
    // Domain Conflict Errors (409)
    // ========================================================================
    /// Caller already voted this entity
    AlreadyVoted,

    /// Caller has not voted this entity
    NotVotedYet,

    /// Entity with the same unique value already exists
    EntityAlreadyExists,

    /// A service with the same name is already registered
    ServiceAlreadyRegistered,

    /// Two schema fragments declare the same name
    SchemaConflict,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Document store operation failed
    DatabaseError,
}

impl ErrorCode {
    /// Taxonomy bucket of this code.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat => ErrorKind::Validation,

            ErrorCode::ModelNotFound
            | ErrorCode::EntityNotFound
            | ErrorCode::ServiceNotFound
            | ErrorCode::ActionNotFound => ErrorKind::NotFound,

            ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::InvalidToken => {
                ErrorKind::Permission
            }

            ErrorCode::AlreadyVoted
            | ErrorCode::NotVotedYet
            | ErrorCode::EntityAlreadyExists
            | ErrorCode::ServiceAlreadyRegistered
            | ErrorCode::SchemaConflict => ErrorKind::DomainConflict,

            ErrorCode::InternalError | ErrorCode::DatabaseError => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Permission => StatusCode::FORBIDDEN,
                ErrorKind::DomainConflict => StatusCode::CONFLICT,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",

            ErrorCode::ModelNotFound => "Model not found",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::ServiceNotFound => "Service not found",
            ErrorCode::ActionNotFound => "Action not found",

            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access forbidden",
            ErrorCode::InvalidToken => "Invalid authentication token",

            ErrorCode::AlreadyVoted => "You have already voted this entity",
            ErrorCode::NotVotedYet => "You have not voted this entity yet",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::ServiceAlreadyRegistered => "Service already registered",
            ErrorCode::SchemaConflict => "Schema name collision",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
        }
    }

    /// Wire name (`SCREAMING_SNAKE_CASE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::InvalidInput => "INVALID_INPUT",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::InvalidFormat => "INVALID_FORMAT",
            ErrorCode::ModelNotFound => "MODEL_NOT_FOUND",
            ErrorCode::EntityNotFound => "ENTITY_NOT_FOUND",
            ErrorCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorCode::ActionNotFound => "ACTION_NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidToken => "INVALID_TOKEN",
            ErrorCode::AlreadyVoted => "ALREADY_VOTED",
            ErrorCode::NotVotedYet => "NOT_VOTED_YET",
            ErrorCode::EntityAlreadyExists => "ENTITY_ALREADY_EXISTS",
            ErrorCode::ServiceAlreadyRegistered => "SERVICE_ALREADY_REGISTERED",
            ErrorCode::SchemaConflict => "SCHEMA_CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error for every dispatch failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, offending values)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// The `{ "error": ... }` envelope.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({ "error": self })
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn model_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ModelNotFound, message)
    }

    /// Create an EntityNotFound error.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn service_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::ServiceNotFound,
            format!("Service '{}' is not registered", name),
        )
    }

    pub fn action_not_found(service: &str, action: &str) -> Self {
        Self::new(
            ErrorCode::ActionNotFound,
            format!("Service '{}' has no action '{}'", service, action),
        )
    }

    /// Create an EntityAlreadyExists error.
    pub fn entity_already_exists(entity_type: &str, field: &str, value: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityAlreadyExists,
            format!("{} with {} '{}' already exists", entity_type, field, value),
        )
    }

    pub fn schema_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SchemaConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self.envelope())).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { collection, id } => {
                tracing::debug!(collection = %collection, id, "document vanished");
                ApiError::from_code(ErrorCode::EntityNotFound)
            }
            StorageError::DuplicateKey {
                collection,
                field,
                value,
            } => ApiError::entity_already_exists(&collection, &field, value),
            StorageError::InvalidDocument { collection, reason } => {
                tracing::error!(collection = %collection, reason = %reason, "invalid document");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(err: CodecError) -> Self {
        tracing::debug!("Rejected identifier: {}", err);
        ApiError::invalid_format("id", "an entity code")
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation_failed(err.message.clone()).with_details(serde_json::json!([err]))
    }
}

impl From<InkwellError> for ApiError {
    fn from(err: InkwellError) -> Self {
        match err {
            InkwellError::Storage(e) => e.into(),
            InkwellError::Codec(e) => e.into(),
            InkwellError::Validation(e) => e.into(),
            InkwellError::Config { field, reason } => {
                tracing::error!(field = %field, reason = %reason, "configuration error");
                ApiError::internal_error("Server misconfigured")
            }
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

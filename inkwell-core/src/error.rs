//! Error types for Inkwell operations

use thiserror::Error;

use crate::identity::DocId;

/// Document store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Document not found in {collection} with id {id}")]
    NotFound { collection: String, id: DocId },

    #[error("Duplicate value for {collection}.{field}: {value}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Invalid document for {collection}: {reason}")]
    InvalidDocument { collection: String, reason: String },
}

/// Opaque identifier decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed identifier: {0}")]
    Malformed(String),

    #[error("Identifier out of range: {0}")]
    OutOfRange(String),
}

/// A single field-level validation failure.
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("{param}: {message}")]
pub struct ValidationError {
    pub param: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            message: message.into(),
        }
    }
}

/// Top-level error for the core and storage crates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InkwellError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },
}

/// Result alias used across the core and storage crates.
pub type InkwellResult<T> = Result<T, InkwellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotFound {
            collection: "hexoposts".to_string(),
            id: 42,
        };
        let display = err.to_string();
        assert!(display.contains("hexoposts"));
        assert!(display.contains("42"));
    }

    #[test]
    fn test_inkwell_error_from_storage() {
        let storage = StorageError::InvalidDocument {
            collection: "tags".to_string(),
            reason: "missing slug".to_string(),
        };
        let err: InkwellError = storage.clone().into();
        assert_eq!(err, InkwellError::Storage(storage));
        assert_eq!(err.to_string(), "Invalid document for tags: missing slug");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::new("title", "must not be empty");
        assert_eq!(err.to_string(), "title: must not be empty");
    }
}

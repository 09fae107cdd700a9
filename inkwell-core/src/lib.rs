//! Inkwell Core - Document and Identity Types
//!
//! Pure data structures shared by the storage layer and the dispatch core.
//! This crate performs no I/O.

pub mod error;
pub mod filter;
pub mod identity;
pub mod user;

pub use error::{CodecError, InkwellError, InkwellResult, StorageError, ValidationError};
pub use filter::{Filter, SortDirection, SortKey, Update};
pub use identity::{doc_id, DocId, Document, IdCodec, Timestamp, ID_FIELD};
pub use user::{AuthUser, Permission, ADMIN_ROLE};

/// Build a [`Document`] from a JSON object literal.
///
/// Non-object values yield an empty document.
pub fn document_from(value: serde_json::Value) -> Document {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_from_object() {
        let doc = document_from(json!({ "title": "Hello" }));
        assert_eq!(doc.get("title"), Some(&json!("Hello")));
    }

    #[test]
    fn test_document_from_non_object() {
        assert!(document_from(json!([1, 2, 3])).is_empty());
        assert!(document_from(json!(null)).is_empty());
    }
}

//! Inkwell Test Utilities
//!
//! Shared test infrastructure for the Inkwell workspace:
//! - Proptest generators for parameter maps, slugs and callers
//! - Fixtures for blog documents and callers
//! - Assertions over core results

pub use inkwell_core::{
    document_from, AuthUser, DocId, Document, Filter, IdCodec, InkwellError, InkwellResult,
    Permission, StorageError, ADMIN_ROLE,
};
pub use inkwell_storage::{Collection, InMemoryCollection, Query};

/// Salt used by every fixture that needs an opaque-id codec.
pub const TEST_SALT: &str = "inkwell-test-salt";

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Internal document keys as the store hands them out.
    pub fn arb_doc_id() -> impl Strategy<Value = DocId> {
        1i64..=i64::MAX
    }

    /// Parameter names: short identifiers.
    pub fn arb_param_name() -> impl Strategy<Value = String> {
        "[a-z][a-zA-Z0-9_]{0,11}"
    }

    /// Scalar parameter values of every JSON type a transport can deliver.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[ -~]{0,16}".prop_map(Value::from),
        ]
    }

    /// Parameter values, one level of nesting.
    pub fn arb_param_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            4 => arb_scalar(),
            1 => prop::collection::vec(arb_scalar(), 0..4).prop_map(Value::Array),
            1 => prop::collection::btree_map(arb_param_name(), arb_scalar(), 0..3)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    }

    /// Normalized request parameters.
    pub fn arb_params() -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map(arb_param_name(), arb_param_value(), 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    /// Action names, custom and REST-idiomatic.
    pub fn arb_action_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("find".to_string()),
            Just("get".to_string()),
            Just("create".to_string()),
            Just("update".to_string()),
            Just("remove".to_string()),
            Just("removeAll".to_string()),
            "[a-z][a-zA-Z]{2,12}",
        ]
    }

    /// Already-normalized slugs.
    pub fn arb_slug() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}(-[a-z0-9]{1,8}){0,3}"
    }

    pub fn arb_permission() -> impl Strategy<Value = Permission> {
        prop_oneof![
            Just(Permission::Public),
            Just(Permission::LoggedIn),
            Just(Permission::Owner),
            Just(Permission::Admin),
        ]
    }

    /// Callers with a valid `persons` code for their id.
    pub fn arb_user() -> impl Strategy<Value = AuthUser> {
        (arb_doc_id(), "[a-z]{3,10}", any::<bool>()).prop_map(|(id, username, admin)| {
            let user = fixtures::user(id, &username);
            if admin {
                user.with_role(ADMIN_ROLE)
            } else {
                user
            }
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use serde_json::json;

    /// Codec of the `persons` service under [`TEST_SALT`].
    pub fn persons_codec() -> IdCodec {
        IdCodec::new(TEST_SALT, "persons")
    }

    /// A caller whose code is consistent with [`persons_codec`].
    pub fn user(id: DocId, username: &str) -> AuthUser {
        AuthUser::new(id, persons_codec().encode(id), username)
    }

    pub fn reader() -> AuthUser {
        user(1, "reader")
    }

    pub fn author() -> AuthUser {
        user(2, "author")
    }

    pub fn admin() -> AuthUser {
        user(3, "admin").with_role(ADMIN_ROLE)
    }

    /// Person documents matching [`reader`], [`author`] and [`admin`], in
    /// insertion order so their ids line up.
    pub fn person_docs() -> Vec<Document> {
        vec![
            document_from(json!({ "username": "reader", "displayName": "Reader" })),
            document_from(json!({ "username": "author", "displayName": "Author" })),
            document_from(json!({ "username": "admin", "displayName": "Admin", "roles": [ADMIN_ROLE] })),
        ]
    }

    pub fn tag_doc(tag_id: &str, name: &str) -> Document {
        document_from(json!({ "name": name, "tag_id": tag_id, "slug": tag_id }))
    }

    pub fn category_doc(category_id: &str, name: &str) -> Document {
        document_from(json!({ "name": name, "category_id": category_id, "slug": category_id }))
    }

    /// A stored-form post: internal keys in `author`/`voters`, external
    /// keys in `tags`.
    pub fn post_doc(title: &str, author: DocId, tags: &[&str]) -> Document {
        document_from(json!({
            "title": title,
            "slug": title.to_lowercase().replace(' ', "-"),
            "content": format!("Body of {}", title),
            "author": author,
            "tags": tags,
            "categories": [],
            "published": true,
            "votes": 0,
            "voters": [],
            "views": 0,
        }))
    }

    /// Insert every document, returning the stored copies.
    pub async fn insert_all(collection: &dyn Collection, docs: Vec<Document>) -> InkwellResult<Vec<Document>> {
        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs {
            stored.push(collection.insert(doc).await?);
        }
        Ok(stored)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;

    /// Assert that a result is Ok.
    pub fn assert_ok<T: std::fmt::Debug>(result: &InkwellResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got {:?}", result);
    }

    /// Assert that a store write was rejected as a duplicate.
    pub fn assert_duplicate_key<T: std::fmt::Debug>(result: &InkwellResult<T>) {
        assert!(
            matches!(result, Err(InkwellError::Storage(StorageError::DuplicateKey { .. }))),
            "Expected DuplicateKey, got {:?}",
            result
        );
    }

    /// Assert that a JSON value is an array of `len` items.
    pub fn assert_len(value: &serde_json::Value, len: usize) {
        assert_eq!(
            value.as_array().map(Vec::len),
            Some(len),
            "Expected array of {}, got {}",
            len,
            value
        );
    }
}

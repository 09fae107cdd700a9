//! Inkwell Storage - Document Collections
//!
//! Defines the collection abstraction the dispatch core talks to, the
//! unexecuted [`Query`] builder, and an in-memory implementation.

pub mod collection;
pub mod memory;
pub mod query;

pub use collection::Collection;
pub use memory::{InMemoryCollection, CREATED_AT, UPDATED_AT};
pub use query::Query;

// Query operators live in the core crate; re-export them for callers that
// only depend on storage.
pub use inkwell_core::{Filter, SortDirection, SortKey, Update};

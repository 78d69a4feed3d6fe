//! Document store contract used by the feed data layer.
//!
//! A store addresses documents by slash-separated paths
//! (`collection/id`), lists collections in a fixed order with cursor
//! pagination, and pushes live snapshots of single documents through a
//! [`DocumentListener`].
//!
//! Two implementations are provided:
//! - [`InMemoryDocumentStore`]: process-local, with access rules and
//!   failure injection for tests and offline demos.
//! - [`RestDocumentStore`]: PostgREST-style HTTP API reached through
//!   [`authed_fetch::AuthedFetch`].

mod backend;
mod cursor;
mod error;
mod listener;
mod memory;
mod path;
mod rest;
mod store;
mod types;

pub use backend::Backend;
pub use cursor::{compare_values, Cursor};
pub use error::{StoreError, StoreResult};
pub use listener::{DocumentEvent, DocumentListener, ListenerRegistration};
pub use memory::{InMemoryDocumentStore, StoreStats};
pub use path::{
    collection_of, document_id, join_path, validate_collection_path, validate_document_path,
};
pub use rest::RestDocumentStore;
pub use store::DocumentStore;
pub use types::{DocumentSnapshot, Fields, ListQuery, OrderDirection, SetOptions};

use crate::{DocumentListener, DocumentSnapshot, Fields, ListQuery, SetOptions, StoreResult};
use async_trait::async_trait;

/// Path-addressed document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point-in-time read. A missing document is a snapshot without fields,
    /// not an error.
    async fn get(&self, path: &str) -> StoreResult<DocumentSnapshot>;

    /// One page of `query.collection`, ordered and starting after the cursor.
    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<DocumentSnapshot>>;

    /// Add a document with a generated id; returns the id.
    async fn create(&self, collection: &str, data: Fields) -> StoreResult<String>;

    /// Write a whole document, or merge into it with [`SetOptions::merge`].
    async fn set(&self, path: &str, data: Fields, options: SetOptions) -> StoreResult<()>;

    /// Merge fields into an existing document; fails if it does not exist.
    async fn update(&self, path: &str, data: Fields) -> StoreResult<()>;

    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Live listener: the current snapshot first, then one per change.
    async fn listen(&self, path: &str) -> StoreResult<DocumentListener>;
}

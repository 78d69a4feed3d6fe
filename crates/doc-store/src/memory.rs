//! Process-local document store.

use crate::path::{collection_of, document_id, validate_collection_path, validate_document_path};
use crate::{
    compare_values, DocumentEvent, DocumentListener, DocumentSnapshot, DocumentStore, Fields,
    ListQuery, ListenerRegistration, OrderDirection, SetOptions, StoreError, StoreResult,
};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Call counters, for asserting how a component used the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub gets: usize,
    pub lists: usize,
    pub writes: usize,
    pub listens: usize,
    pub active_listeners: usize,
    pub released_listeners: usize,
}

type Watcher = (u64, mpsc::UnboundedSender<DocumentEvent>);

#[derive(Default)]
struct State {
    documents: BTreeMap<String, Fields>,
    watchers: HashMap<String, Vec<Watcher>>,
    next_watch_id: u64,
    denied_prefixes: Vec<String>,
    pending_failures: VecDeque<StoreError>,
    latency: Option<Duration>,
    stats: StoreStats,
}

impl State {
    fn check(&mut self, path: &str) -> StoreResult<()> {
        if let Some(err) = self.pending_failures.pop_front() {
            return Err(err);
        }
        if self.is_denied(path) {
            return Err(StoreError::permission_denied(
                path,
                "access denied by store rules",
            ));
        }
        Ok(())
    }

    fn is_denied(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        self.denied_prefixes
            .iter()
            .any(|prefix| path == prefix || path.starts_with(&format!("{}/", prefix)))
    }

    fn snapshot(&self, path: &str) -> StoreResult<DocumentSnapshot> {
        let path = path.trim_matches('/');
        let id = document_id(path)?;
        Ok(match self.documents.get(path) {
            Some(fields) => DocumentSnapshot::existing(path, id, fields.clone()),
            None => DocumentSnapshot::missing(path, id),
        })
    }

    fn notify(&mut self, path: &str) {
        let path = path.trim_matches('/');
        let Ok(snapshot) = self.snapshot(path) else {
            return;
        };
        if let Some(watchers) = self.watchers.get_mut(path) {
            watchers.retain(|(_, tx)| {
                tx.send(DocumentEvent::Snapshot(snapshot.clone())).is_ok()
            });
        }
    }
}

/// In-memory [`DocumentStore`] with access rules and failure injection.
///
/// Cloning shares the same data.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Insert or replace a document without going through access rules.
    pub fn seed(&self, path: &str, data: Value) -> StoreResult<()> {
        validate_document_path(path)?;
        let Value::Object(fields) = data else {
            return Err(StoreError::Decode(format!(
                "document data for '{}' must be an object",
                path
            )));
        };
        let mut state = self.state();
        state
            .documents
            .insert(path.trim_matches('/').to_string(), fields);
        state.notify(path);
        Ok(())
    }

    /// Current fields of a document, bypassing access rules.
    pub fn peek(&self, path: &str) -> Option<Fields> {
        self.state().documents.get(path.trim_matches('/')).cloned()
    }

    pub fn document_count(&self) -> usize {
        self.state().documents.len()
    }

    /// Refuse every operation on `prefix` and everything below it.
    pub fn deny(&self, prefix: &str) {
        self.state()
            .denied_prefixes
            .push(prefix.trim_matches('/').to_string());
    }

    pub fn allow_all(&self) {
        self.state().denied_prefixes.clear();
    }

    /// Deny `prefix` and fail every live listener below it.
    pub fn revoke(&self, prefix: &str) {
        let prefix = prefix.trim_matches('/').to_string();
        let mut state = self.state();
        state.denied_prefixes.push(prefix.clone());

        let affected: Vec<String> = state
            .watchers
            .keys()
            .filter(|path| **path == prefix || path.starts_with(&format!("{}/", prefix)))
            .cloned()
            .collect();
        for path in affected {
            if let Some(watchers) = state.watchers.get_mut(&path) {
                for (_, tx) in watchers.drain(..) {
                    let _ = tx.send(DocumentEvent::Error(StoreError::permission_denied(
                        path.clone(),
                        "access revoked",
                    )));
                }
            }
        }
    }

    /// Make the next operation fail with `err`. Failures queue up.
    pub fn fail_next(&self, err: StoreError) {
        self.state().pending_failures.push_back(err);
    }

    /// Delay every read (`get`, `list`) by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    pub fn stats(&self) -> StoreStats {
        self.state().stats.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn release_watcher(state: &Weak<Mutex<State>>, path: &str, id: u64) {
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = lock(&state);
        if let Some(watchers) = state.watchers.get_mut(path) {
            watchers.retain(|(existing, _)| *existing != id);
            if watchers.is_empty() {
                state.watchers.remove(path);
            }
        }
        state.stats.active_listeners = state.stats.active_listeners.saturating_sub(1);
        state.stats.released_listeners += 1;
        trace!(path, listener_id = id, "in-memory listener released");
    }
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..20].to_string()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<DocumentSnapshot> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.stats.gets += 1;
        validate_document_path(path)?;
        state.check(path)?;
        state.snapshot(path)
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<DocumentSnapshot>> {
        self.simulate_latency().await;
        let mut state = self.state();
        state.stats.lists += 1;
        validate_collection_path(&query.collection)?;
        state.check(&query.collection)?;

        let collection = query.collection.trim_matches('/');
        let mut docs: Vec<DocumentSnapshot> = state
            .documents
            .iter()
            .filter(|(path, _)| {
                collection_of(path)
                    .map(|c| c == collection)
                    .unwrap_or(false)
            })
            .filter_map(|(path, fields)| {
                let id = document_id(path).ok()?;
                Some(DocumentSnapshot::existing(path.clone(), id, fields.clone()))
            })
            .collect();

        let order_value = |doc: &DocumentSnapshot| {
            doc.get(&query.order_by).cloned().unwrap_or(Value::Null)
        };
        docs.sort_by(|a, b| {
            let ord = compare_values(&order_value(a), &order_value(b))
                .then_with(|| a.id.cmp(&b.id));
            match query.direction {
                OrderDirection::Ascending => ord,
                OrderDirection::Descending => ord.reverse(),
            }
        });

        if let Some(cursor) = &query.start_after {
            docs.retain(|doc| {
                let ord = cursor.compare(&order_value(doc), &doc.id);
                match query.direction {
                    OrderDirection::Ascending => ord == Ordering::Greater,
                    OrderDirection::Descending => ord == Ordering::Less,
                }
            });
        }

        docs.truncate(query.limit);
        debug!(collection, returned = docs.len(), "in-memory list");
        Ok(docs)
    }

    async fn create(&self, collection: &str, data: Fields) -> StoreResult<String> {
        validate_collection_path(collection)?;
        let mut state = self.state();
        state.stats.writes += 1;
        state.check(collection)?;

        let id = new_document_id();
        let path = format!("{}/{}", collection.trim_matches('/'), id);
        state.documents.insert(path.clone(), data);
        state.notify(&path);
        Ok(id)
    }

    async fn set(&self, path: &str, data: Fields, options: SetOptions) -> StoreResult<()> {
        validate_document_path(path)?;
        let mut state = self.state();
        state.stats.writes += 1;
        state.check(path)?;

        let key = path.trim_matches('/').to_string();
        let document = state.documents.entry(key.clone()).or_default();
        if options.merge {
            document.extend(data);
        } else {
            *document = data;
        }
        state.notify(&key);
        Ok(())
    }

    async fn update(&self, path: &str, data: Fields) -> StoreResult<()> {
        validate_document_path(path)?;
        let mut state = self.state();
        state.stats.writes += 1;
        state.check(path)?;

        let key = path.trim_matches('/').to_string();
        let existing = state
            .documents
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        existing.extend(data);
        state.notify(&key);
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        validate_document_path(path)?;
        let mut state = self.state();
        state.stats.writes += 1;
        state.check(path)?;

        let key = path.trim_matches('/').to_string();
        state.documents.remove(&key);
        state.notify(&key);
        Ok(())
    }

    async fn listen(&self, path: &str) -> StoreResult<DocumentListener> {
        validate_document_path(path)?;
        let key = path.trim_matches('/').to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.state();
        state.stats.listens += 1;
        if let Some(err) = state.pending_failures.pop_front() {
            return Err(err);
        }

        if state.is_denied(&key) {
            let _ = tx.send(DocumentEvent::Error(StoreError::permission_denied(
                key.clone(),
                "access denied by store rules",
            )));
            return Ok(DocumentListener::new(rx, ListenerRegistration::noop()));
        }

        let _ = tx.send(DocumentEvent::Snapshot(state.snapshot(&key)?));
        state.next_watch_id += 1;
        let id = state.next_watch_id;
        state.watchers.entry(key.clone()).or_default().push((id, tx));
        state.stats.active_listeners += 1;
        drop(state);

        let weak = Arc::downgrade(&self.state);
        let registration =
            ListenerRegistration::new(move || Self::release_watcher(&weak, &key, id));
        Ok(DocumentListener::new(rx, registration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cursor;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn seeded_posts(count: usize) -> InMemoryDocumentStore {
        let store = InMemoryDocumentStore::new();
        for i in 0..count {
            let data = json!({ "createdAt": i, "title": format!("post {}", i) });
            store.seed(&format!("posts/p{:02}", i), data).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_get_existing_and_missing() {
        let store = InMemoryDocumentStore::new();
        store.seed("users/u1", json!({ "username": "ada" })).unwrap();

        let snap = store.get("users/u1").await.unwrap();
        assert_eq!(snap.data(), Some(json!({ "username": "ada", "id": "u1" })));

        let snap = store.get("users/nobody").await.unwrap();
        assert!(!snap.exists());
    }

    #[tokio::test]
    async fn test_list_descending_with_cursor() {
        let store = seeded_posts(10);
        let query = ListQuery::new("posts").limit(4);

        let first = store.list(&query).await.unwrap();
        let ids: Vec<_> = first.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p09", "p08", "p07", "p06"]);

        let cursor = first.last().map(|d| d.cursor("createdAt"));
        let second = store.list(&query.clone().start_after(cursor)).await.unwrap();
        let ids: Vec<_> = second.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["p05", "p04", "p03", "p02"]);
    }

    #[tokio::test]
    async fn test_list_ascending() {
        let store = seeded_posts(3);
        let query = ListQuery::new("posts").order_by("createdAt", OrderDirection::Ascending);
        let ids: Vec<_> = store
            .list(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["p00", "p01", "p02"]);
    }

    #[tokio::test]
    async fn test_list_ignores_subcollections() {
        let store = seeded_posts(2);
        store
            .seed("posts/p00/comments/c1", json!({ "createdAt": 99 }))
            .unwrap();

        let docs = store.list(&ListQuery::new("posts")).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn test_list_ties_broken_by_id() {
        let store = InMemoryDocumentStore::new();
        for id in ["a", "b", "c"] {
            store.seed(&format!("posts/{}", id), json!({ "createdAt": 1 })).unwrap();
        }
        let query = ListQuery::new("posts")
            .limit(2)
            .start_after(Some(Cursor::new(json!(1), "c")));
        let ids: Vec<_> = store
            .list(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_denied_prefix() {
        let store = seeded_posts(1);
        store.deny("posts");

        let err = store.list(&ListQuery::new("posts")).await.unwrap_err();
        assert!(err.is_permission_denied());
        let err = store.get("posts/p00").await.unwrap_err();
        assert!(err.is_permission_denied());

        store.allow_all();
        assert!(store.get("posts/p00").await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let store = seeded_posts(1);
        store.fail_next(StoreError::Network("offline".into()));

        assert!(store.get("posts/p00").await.is_err());
        assert!(store.get("posts/p00").await.is_ok());
    }

    #[tokio::test]
    async fn test_writes() {
        let store = InMemoryDocumentStore::new();
        let id = store
            .create("posts", fields(json!({ "title": "first" })))
            .await
            .unwrap();
        assert_eq!(id.len(), 20);
        let path = format!("posts/{}", id);

        store
            .set(&path, fields(json!({ "likes": 1 })), SetOptions::merge())
            .await
            .unwrap();
        assert_eq!(store.peek(&path).unwrap().len(), 2);

        store
            .set(&path, fields(json!({ "likes": 2 })), SetOptions::default())
            .await
            .unwrap();
        assert_eq!(Value::Object(store.peek(&path).unwrap()), json!({ "likes": 2 }));

        store.update(&path, fields(json!({ "title": "x" }))).await.unwrap();
        assert_eq!(store.peek(&path).unwrap()["title"], "x");

        store.delete(&path).await.unwrap();
        assert!(store.peek(&path).is_none());
        assert_eq!(store.stats().writes, 5);
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update("posts/nope", fields(json!({ "a": 1 })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listen_initial_and_changes() {
        let store = InMemoryDocumentStore::new();
        let mut listener = store.listen("users/u1").await.unwrap();

        match listener.next().await {
            Some(DocumentEvent::Snapshot(snap)) => assert!(!snap.exists()),
            other => panic!("unexpected event: {:?}", other),
        }

        store.seed("users/u1", json!({ "username": "ada" })).unwrap();
        match listener.next().await {
            Some(DocumentEvent::Snapshot(snap)) => {
                assert_eq!(snap.get("username").unwrap(), "ada")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(store.stats().active_listeners, 1);
    }

    #[tokio::test]
    async fn test_listener_released_once_on_drop() {
        let store = InMemoryDocumentStore::new();
        let listener = store.listen("users/u1").await.unwrap();
        let (_rx, mut registration) = listener.into_parts();

        registration.remove();
        drop(registration);

        let stats = store.stats();
        assert_eq!(stats.active_listeners, 0);
        assert_eq!(stats.released_listeners, 1);
    }

    #[tokio::test]
    async fn test_revoke_fails_live_listener() {
        let store = InMemoryDocumentStore::new();
        store.seed("users/u1", json!({ "username": "ada" })).unwrap();
        let mut listener = store.listen("users/u1").await.unwrap();
        let _ = listener.next().await;

        store.revoke("users");
        match listener.next().await {
            Some(DocumentEvent::Error(err)) => assert!(err.is_permission_denied()),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(listener.next().await.is_none());
    }

    #[tokio::test]
    async fn test_listen_denied_emits_error() {
        let store = InMemoryDocumentStore::new();
        store.deny("users/u1");
        let mut listener = store.listen("users/u1").await.unwrap();
        assert!(matches!(listener.next().await, Some(DocumentEvent::Error(_))));
    }

    #[test]
    fn test_seed_rejects_non_object() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            store.seed("posts/p1", json!(3)),
            Err(StoreError::Decode(_))
        ));
        assert!(matches!(
            store.seed("posts", json!({})),
            Err(StoreError::InvalidPath(_))
        ));
    }
}

//! Fire-and-forget document writes.
//!
//! Each write runs on its own task. Failures are reported once on the error
//! channel as a [`PermissionError`]; the caller never sees them directly.

use doc_store::{Backend, DocumentStore, Fields, SetOptions, StoreError};
use error_channel::{ErrorChannel, Operation, PermissionError};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct NonBlockingWriter {
    backend: Backend,
    channel: ErrorChannel,
    runtime: Handle,
}

impl NonBlockingWriter {
    pub fn new(backend: Backend, channel: ErrorChannel, runtime: Handle) -> Self {
        Self {
            backend,
            channel,
            runtime,
        }
    }

    /// Add a document to `collection`. The handle yields the new id, or
    /// `None` if the write failed. Returns `None` when nothing was attempted.
    pub fn create_document(
        &self,
        collection: &str,
        data: Fields,
    ) -> Option<JoinHandle<Option<String>>> {
        let store = self.target(collection, Operation::Create)?;
        let channel = self.channel.clone();
        let collection = collection.to_string();

        Some(self.runtime.spawn(async move {
            let payload = Value::Object(data.clone());
            match store.create(&collection, data).await {
                Ok(id) => {
                    debug!(collection = %collection, id = %id, "Document created");
                    Some(id)
                }
                Err(e) => {
                    report(&channel, &collection, Operation::Create, Some(payload), &e);
                    None
                }
            }
        }))
    }

    pub fn set_document(&self, path: &str, data: Fields, options: SetOptions) {
        let Some(store) = self.target(path, Operation::Write) else {
            return;
        };
        let channel = self.channel.clone();
        let path = path.to_string();

        self.runtime.spawn(async move {
            let payload = Value::Object(data.clone());
            match store.set(&path, data, options).await {
                Ok(()) => debug!(path = %path, merge = options.merge, "Document set"),
                Err(e) => report(&channel, &path, Operation::Write, Some(payload), &e),
            }
        });
    }

    pub fn update_document(&self, path: &str, data: Fields) {
        let Some(store) = self.target(path, Operation::Update) else {
            return;
        };
        let channel = self.channel.clone();
        let path = path.to_string();

        self.runtime.spawn(async move {
            let payload = Value::Object(data.clone());
            match store.update(&path, data).await {
                Ok(()) => debug!(path = %path, "Document updated"),
                Err(e) => report(&channel, &path, Operation::Update, Some(payload), &e),
            }
        });
    }

    pub fn delete_document(&self, path: &str) {
        let Some(store) = self.target(path, Operation::Delete) else {
            return;
        };
        let channel = self.channel.clone();
        let path = path.to_string();

        self.runtime.spawn(async move {
            match store.delete(&path).await {
                Ok(()) => debug!(path = %path, "Document deleted"),
                Err(e) => report(&channel, &path, Operation::Delete, None, &e),
            }
        });
    }

    fn target(&self, path: &str, operation: Operation) -> Option<Arc<dyn DocumentStore>> {
        if path.trim_matches('/').is_empty() {
            warn!(operation = %operation, "Write skipped: missing document reference");
            return None;
        }
        let store = self.backend.store().cloned();
        if store.is_none() {
            warn!(path, operation = %operation, "Write skipped: document store unavailable");
        }
        store
    }
}

fn report(
    channel: &ErrorChannel,
    path: &str,
    operation: Operation,
    payload: Option<Value>,
    err: &StoreError,
) {
    warn!(path, operation = %operation, error = %err, "Background write failed");
    channel.publish_permission(PermissionError::new(path, operation, payload));
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_store::InMemoryDocumentStore;
    use error_channel::PERMISSION_ERROR;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    struct Harness {
        store: InMemoryDocumentStore,
        writer: NonBlockingWriter,
        errors: mpsc::UnboundedReceiver<PermissionError>,
        _handle: error_channel::ListenerHandle,
    }

    fn harness() -> Harness {
        let store = InMemoryDocumentStore::new();
        let channel = ErrorChannel::new();
        let (tx, errors) = mpsc::unbounded_channel();
        let _handle = channel.subscribe(PERMISSION_ERROR, move |event| {
            if let Some(err) = event.permission() {
                let _ = tx.send(err.clone());
            }
        });
        let writer = NonBlockingWriter::new(
            Backend::available(store.clone()),
            channel,
            Handle::current(),
        );
        Harness {
            store,
            writer,
            errors,
            _handle,
        }
    }

    async fn next_error(errors: &mut mpsc::UnboundedReceiver<PermissionError>) -> PermissionError {
        tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .expect("no error published")
            .expect("channel closed")
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_create_returns_new_id() {
        let h = harness();
        let handle = h
            .writer
            .create_document("posts", fields(json!({ "title": "hello" })))
            .unwrap();
        let id = handle.await.unwrap().unwrap();
        assert_eq!(
            h.store.peek(&format!("posts/{}", id)).unwrap()["title"],
            "hello"
        );
    }

    #[tokio::test]
    async fn test_create_failure_publishes_once_with_payload() {
        let mut h = harness();
        h.store.deny("posts");
        let handle = h
            .writer
            .create_document("posts", fields(json!({ "title": "hello" })))
            .unwrap();

        assert_eq!(handle.await.unwrap(), None);
        let err = next_error(&mut h.errors).await;
        assert_eq!(err.operation(), Operation::Create);
        assert_eq!(err.path(), "posts");
        assert_eq!(err.request_payload(), Some(&json!({ "title": "hello" })));
        assert!(h.errors.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_merge_and_replace() {
        let h = harness();
        h.store.seed("users/u1", json!({ "name": "Ada", "bio": "x" })).unwrap();

        h.writer
            .set_document("users/u1", fields(json!({ "bio": "y" })), SetOptions::merge());
        let store = h.store.clone();
        eventually(move || {
            store.peek("users/u1").map(|f| f["bio"] == "y").unwrap_or(false)
        })
        .await;
        assert_eq!(h.store.peek("users/u1").unwrap()["name"], "Ada");

        h.writer
            .set_document("users/u1", fields(json!({ "bio": "z" })), SetOptions::default());
        let store = h.store.clone();
        eventually(move || {
            store.peek("users/u1").map(|f| f["bio"] == "z").unwrap_or(false)
        })
        .await;
        assert!(h.store.peek("users/u1").unwrap().get("name").is_none());
    }

    #[tokio::test]
    async fn test_set_failure_reports_write() {
        let mut h = harness();
        h.store.deny("users");
        h.writer
            .set_document("users/u1", fields(json!({ "bio": "y" })), SetOptions::merge());

        let err = next_error(&mut h.errors).await;
        assert_eq!(err.operation(), Operation::Write);
        assert_eq!(err.request_payload(), Some(&json!({ "bio": "y" })));
    }

    #[tokio::test]
    async fn test_update_missing_document_reports_update() {
        let mut h = harness();
        h.writer
            .update_document("posts/missing", fields(json!({ "likes": 1 })));

        let err = next_error(&mut h.errors).await;
        assert_eq!(err.operation(), Operation::Update);
        assert_eq!(err.path(), "posts/missing");
    }

    #[tokio::test]
    async fn test_delete_failure_has_no_payload() {
        let mut h = harness();
        h.store.deny("posts");
        h.writer.delete_document("posts/p1");

        let err = next_error(&mut h.errors).await;
        assert_eq!(err.operation(), Operation::Delete);
        assert_eq!(err.request_payload(), None);
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let h = harness();
        h.store.seed("posts/p1", json!({ "title": "x" })).unwrap();
        h.writer.delete_document("posts/p1");
        let store = h.store.clone();
        eventually(move || store.peek("posts/p1").is_none()).await;
    }

    #[tokio::test]
    async fn test_missing_backend_or_reference_skips_silently() {
        let channel = ErrorChannel::new();
        let (tx, mut errors) = mpsc::unbounded_channel::<()>();
        let _handle = channel.subscribe(PERMISSION_ERROR, move |_| {
            let _ = tx.send(());
        });

        let writer = NonBlockingWriter::new(Backend::Unavailable, channel.clone(), Handle::current());
        assert!(writer
            .create_document("posts", fields(json!({ "title": "x" })))
            .is_none());
        writer.delete_document("posts/p1");

        let store = InMemoryDocumentStore::new();
        let writer = NonBlockingWriter::new(Backend::available(store.clone()), channel, Handle::current());
        assert!(writer.create_document("", Fields::new()).is_none());
        writer.update_document("/", Fields::new());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(errors.try_recv().is_err());
        assert_eq!(store.stats().writes, 0);
    }
}

//! PostgREST-style HTTP document store.
//!
//! Each collection is a table under `/rest/v1/<table>`; a document is a row
//! whose `id` column is the document id and whose other columns are its
//! fields. Nested collections (`posts/p1/comments`) map to the table named
//! by the last segment, scoped by a `parent_path` column.
//!
//! Requests go through [`AuthedFetch`], so the caller's ID token rides on
//! every call and a 401 triggers one refresh-and-retry.

use crate::path::{collection_of, document_id, validate_collection_path, validate_document_path};
use crate::{
    Cursor, DocumentEvent, DocumentListener, DocumentSnapshot, DocumentStore, Fields, ListQuery,
    ListenerRegistration, OrderDirection, SetOptions, StoreError, StoreResult,
};
use async_trait::async_trait;
use authed_fetch::{AuthedFetch, FetchError, FetchOptions, FetchRequest, FetchResponse, Method};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

const PARENT_COLUMN: &str = "parent_path";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Table plus optional parent scope for a collection path.
struct Table {
    name: String,
    parent: Option<String>,
}

impl Table {
    fn for_collection(collection: &str) -> StoreResult<Self> {
        validate_collection_path(collection)?;
        let collection = collection.trim_matches('/');
        Ok(match collection.rsplit_once('/') {
            Some((parent, name)) => Table {
                name: name.to_string(),
                parent: Some(parent.to_string()),
            },
            None => Table {
                name: collection.to_string(),
                parent: None,
            },
        })
    }
}

#[derive(Clone)]
pub struct RestDocumentStore {
    fetch: AuthedFetch,
    api_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl RestDocumentStore {
    /// # Arguments
    /// * `api_url` - Base URL of the REST API (e.g. `https://xyz.example.co`)
    /// * `api_key` - Public project key sent as `apikey`, if the API wants one
    /// * `fetch` - Authenticated HTTP client
    pub fn new(api_url: impl Into<String>, api_key: Option<String>, fetch: AuthedFetch) -> Self {
        Self {
            fetch,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// How often live listeners re-read their document (at least 10ms).
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(10));
        self
    }

    fn table_url(&self, table: &Table) -> StoreResult<Url> {
        let raw = format!("{}/rest/v1/{}", self.api_url, table.name);
        let mut url = Url::parse(&raw)
            .map_err(|e| StoreError::InvalidPath(format!("{}: {}", raw, e)))?;
        if let Some(parent) = &table.parent {
            url.query_pairs_mut()
                .append_pair(PARENT_COLUMN, &format!("eq.{}", parent));
        }
        Ok(url)
    }

    fn document_url(&self, path: &str) -> StoreResult<Url> {
        validate_document_path(path)?;
        let table = Table::for_collection(&collection_of(path)?)?;
        let mut url = self.table_url(&table)?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", document_id(path)?));
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> FetchRequest {
        let mut request =
            FetchRequest::new(method, url.to_string()).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        request
    }

    async fn execute(&self, path: &str, request: FetchRequest) -> StoreResult<FetchResponse> {
        let response = self
            .fetch
            .fetch(&request, FetchOptions::default())
            .await?;

        if response.is_success() {
            return Ok(response);
        }

        let status = response.status.as_u16();
        let body = response.text();
        warn!(
            method = %request.method,
            path,
            status,
            body_len = body.len(),
            "store request failed"
        );
        Err(match status {
            401 | 403 => StoreError::permission_denied(path, body),
            404 => StoreError::NotFound(path.to_string()),
            _ => StoreError::Fetch(FetchError::Status { status, body }),
        })
    }

    fn rows(response: &FetchResponse) -> StoreResult<Vec<Fields>> {
        let rows: Vec<Value> = response
            .json()
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.into_iter()
            .map(|row| match row {
                Value::Object(fields) => Ok(fields),
                other => Err(StoreError::Decode(format!("expected row object, got {}", other))),
            })
            .collect()
    }

    fn snapshot_from_row(collection: &str, mut row: Fields) -> StoreResult<DocumentSnapshot> {
        let id = match row.remove("id") {
            Some(Value::String(id)) => id,
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(StoreError::Decode("row without id".to_string())),
        };
        row.remove(PARENT_COLUMN);
        let path = format!("{}/{}", collection.trim_matches('/'), id);
        Ok(DocumentSnapshot::existing(path, id, row))
    }

    fn row_for(path: &str, data: Fields) -> StoreResult<Fields> {
        let mut row = data;
        row.insert("id".to_string(), Value::String(document_id(path)?));
        let collection = collection_of(path)?;
        if let Some((parent, _)) = collection.rsplit_once('/') {
            row.insert(PARENT_COLUMN.to_string(), Value::String(parent.to_string()));
        }
        Ok(row)
    }
}

/// PostgREST literal for a filter value.
fn filter_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}

/// `or=(...)` filter selecting rows strictly after `cursor` in the given order.
fn start_after_filter(order_by: &str, direction: OrderDirection, cursor: &Cursor) -> String {
    let op = match direction {
        OrderDirection::Ascending => "gt",
        OrderDirection::Descending => "lt",
    };
    let id = filter_literal(&Value::String(cursor.id.clone()));
    if cursor.order_value.is_null() {
        return format!("(id.{}.{})", op, id);
    }
    let value = filter_literal(&cursor.order_value);
    format!(
        "({field}.{op}.{value},and({field}.eq.{value},id.{op}.{id}))",
        field = order_by,
        op = op,
        value = value,
        id = id
    )
}

#[async_trait]
impl DocumentStore for RestDocumentStore {
    async fn get(&self, path: &str) -> StoreResult<DocumentSnapshot> {
        let mut url = self.document_url(path)?;
        url.query_pairs_mut().append_pair("limit", "1");

        let response = self.execute(path, self.request(Method::GET, url)).await?;
        let collection = collection_of(path)?;
        match Self::rows(&response)?.into_iter().next() {
            Some(row) => Self::snapshot_from_row(&collection, row),
            None => Ok(DocumentSnapshot::missing(
                path.trim_matches('/'),
                document_id(path)?,
            )),
        }
    }

    async fn list(&self, query: &ListQuery) -> StoreResult<Vec<DocumentSnapshot>> {
        let table = Table::for_collection(&query.collection)?;
        let mut url = self.table_url(&table)?;
        let direction = match query.direction {
            OrderDirection::Ascending => "asc",
            OrderDirection::Descending => "desc",
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(
                "order",
                &format!("{field}.{dir},id.{dir}", field = query.order_by, dir = direction),
            );
            if query.limit != usize::MAX {
                pairs.append_pair("limit", &query.limit.to_string());
            }
            if let Some(cursor) = &query.start_after {
                pairs.append_pair(
                    "or",
                    &start_after_filter(&query.order_by, query.direction, cursor),
                );
            }
        }

        let response = self
            .execute(&query.collection, self.request(Method::GET, url))
            .await?;
        let docs = Self::rows(&response)?
            .into_iter()
            .map(|row| Self::snapshot_from_row(&query.collection, row))
            .collect::<StoreResult<Vec<_>>>()?;
        debug!(collection = %query.collection, returned = docs.len(), "rest list");
        Ok(docs)
    }

    async fn create(&self, collection: &str, data: Fields) -> StoreResult<String> {
        let table = Table::for_collection(collection)?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = format!("{}/{}", collection.trim_matches('/'), id);
        let row = Self::row_for(&path, data)?;

        let mut url = self.table_url(&table)?;
        url.set_query(None);
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(&row)?;
        self.execute(collection, request).await?;
        Ok(id)
    }

    async fn set(&self, path: &str, data: Fields, options: SetOptions) -> StoreResult<()> {
        let row = Self::row_for(path, data)?;
        let request = if options.merge {
            let table = Table::for_collection(&collection_of(path)?)?;
            let mut url = self.table_url(&table)?;
            url.set_query(None);
            self.request(Method::POST, url)
                .header("Prefer", "resolution=merge-duplicates")
                .json(&row)?
        } else {
            self.request(Method::PUT, self.document_url(path)?)
                .json(&row)?
        };
        self.execute(path, request).await?;
        Ok(())
    }

    async fn update(&self, path: &str, data: Fields) -> StoreResult<()> {
        let request = self
            .request(Method::PATCH, self.document_url(path)?)
            .header("Prefer", "return=representation")
            .json(&data)?;
        let response = self.execute(path, request).await?;
        if Self::rows(&response)?.is_empty() {
            return Err(StoreError::NotFound(path.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let request = self.request(Method::DELETE, self.document_url(path)?);
        self.execute(path, request).await?;
        Ok(())
    }

    async fn listen(&self, path: &str) -> StoreResult<DocumentListener> {
        validate_document_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let path = path.trim_matches('/').to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.poll_interval);
            let mut last: Option<DocumentSnapshot> = None;
            loop {
                ticker.tick().await;
                match store.get(&path).await {
                    Ok(snapshot) => {
                        if last.as_ref() == Some(&snapshot) {
                            continue;
                        }
                        if tx.send(DocumentEvent::Snapshot(snapshot.clone())).is_err() {
                            break;
                        }
                        last = Some(snapshot);
                    }
                    Err(e) => {
                        debug!(path = %path, error = %e, "rest listener stopped");
                        let _ = tx.send(DocumentEvent::Error(e));
                        break;
                    }
                }
            }
        });

        let abort = task.abort_handle();
        Ok(DocumentListener::new(
            rx,
            ListenerRegistration::new(move || abort.abort()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authed_fetch::stub_server::{RecordedRequest, StubResponse, StubServer};
    use authed_fetch::StaticTokenProvider;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn store_for(server: &StubServer) -> RestDocumentStore {
        let fetch = AuthedFetch::new(Arc::new(StaticTokenProvider::new("id-token")));
        RestDocumentStore::new(server.base_url(), Some("anon-key".into()), fetch)
            .with_poll_interval(Duration::from_millis(20))
    }

    fn query_of(req: &RecordedRequest) -> HashMap<String, String> {
        Url::parse(&format!("http://stub{}", req.path))
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect()
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_get_existing_row() {
        let server = StubServer::start(|_| {
            StubResponse::json(200, json!([{ "id": "u1", "username": "ada" }]))
        })
        .await
        .unwrap();
        let store = store_for(&server);

        let snap = store.get("users/u1").await.unwrap();
        assert_eq!(snap.data(), Some(json!({ "id": "u1", "username": "ada" })));

        let req = &server.requests()[0];
        assert!(req.path.starts_with("/rest/v1/users?"));
        assert_eq!(query_of(req)["id"], "eq.u1");
        assert_eq!(req.header("apikey"), Some("anon-key"));
        assert_eq!(req.header("authorization"), Some("Bearer id-token"));
    }

    #[tokio::test]
    async fn test_get_missing_row() {
        let server = StubServer::start(|_| StubResponse::json(200, json!([])))
            .await
            .unwrap();
        let snap = store_for(&server).get("users/u9").await.unwrap();
        assert!(!snap.exists());
        assert_eq!(snap.id, "u9");
    }

    #[tokio::test]
    async fn test_list_builds_order_limit_and_cursor() {
        let server = StubServer::start(|_| {
            StubResponse::json(200, json!([{ "id": "p3", "createdAt": 3 }]))
        })
        .await
        .unwrap();
        let store = store_for(&server);

        let query = ListQuery::new("posts")
            .limit(8)
            .start_after(Some(Cursor::new(json!(5), "p5")));
        let docs = store.list(&query).await.unwrap();
        assert_eq!(docs[0].path, "posts/p3");

        let params = query_of(&server.requests()[0]);
        assert_eq!(params["order"], "createdAt.desc,id.desc");
        assert_eq!(params["limit"], "8");
        assert_eq!(
            params["or"],
            r#"(createdAt.lt.5,and(createdAt.eq.5,id.lt."p5"))"#
        );
    }

    #[tokio::test]
    async fn test_nested_collection_scoped_by_parent() {
        let server = StubServer::start(|_| {
            let row = json!({ "id": "c1", "parent_path": "posts/p1", "text": "hi" });
            StubResponse::json(200, json!([row]))
        })
        .await
        .unwrap();
        let docs = store_for(&server)
            .list(&ListQuery::new("posts/p1/comments"))
            .await
            .unwrap();

        assert_eq!(docs[0].path, "posts/p1/comments/c1");
        assert!(docs[0].get("parent_path").is_none());
        let req = &server.requests()[0];
        assert!(req.path.starts_with("/rest/v1/comments?"));
        assert_eq!(query_of(req)["parent_path"], "eq.posts/p1");
    }

    #[tokio::test]
    async fn test_forbidden_maps_to_permission_denied() {
        let server = StubServer::start(|_| StubResponse::text(403, "row level security"))
            .await
            .unwrap();
        let err = store_for(&server)
            .list(&ListQuery::new("posts"))
            .await
            .unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[tokio::test]
    async fn test_server_error_is_transient_fetch_error() {
        let server = StubServer::start(|_| StubResponse::text(503, "busy"))
            .await
            .unwrap();
        let err = store_for(&server).get("posts/p1").await.unwrap_err();
        assert!(matches!(err, StoreError::Fetch(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_create_posts_row_with_generated_id() {
        let server = StubServer::start(|_| StubResponse::text(201, ""))
            .await
            .unwrap();
        let id = store_for(&server)
            .create("posts", fields(json!({ "title": "hello" })))
            .await
            .unwrap();

        let req = &server.requests()[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/rest/v1/posts");
        assert_eq!(req.json()["id"], id.as_str());
        assert_eq!(req.json()["title"], "hello");
    }

    #[tokio::test]
    async fn test_set_merge_upserts() {
        let server = StubServer::start(|_| StubResponse::text(201, ""))
            .await
            .unwrap();
        let store = store_for(&server);
        store
            .set("users/u1", fields(json!({ "name": "Ada" })), SetOptions::merge())
            .await
            .unwrap();
        store
            .set("users/u1", fields(json!({ "name": "Ada" })), SetOptions::default())
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests[0].method, "POST");
        assert_eq!(
            requests[0].header("prefer"),
            Some("resolution=merge-duplicates")
        );
        assert_eq!(requests[1].method, "PUT");
        assert_eq!(query_of(&requests[1])["id"], "eq.u1");
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found() {
        let server = StubServer::start(|_| StubResponse::json(200, json!([])))
            .await
            .unwrap();
        let err = store_for(&server)
            .update("posts/p1", fields(json!({ "likes": 2 })))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_listen_polls_and_emits_changes_only() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let server = StubServer::start(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let likes = if n < 2 { 1 } else { 2 };
            StubResponse::json(200, json!([{ "id": "p1", "likes": likes }]))
        })
        .await
        .unwrap();
        let store = store_for(&server);

        let mut listener = store.listen("posts/p1").await.unwrap();
        let first = match listener.next().await {
            Some(DocumentEvent::Snapshot(snap)) => snap,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(first.get("likes"), Some(&json!(1)));

        let second = match listener.next().await {
            Some(DocumentEvent::Snapshot(snap)) => snap,
            other => panic!("unexpected event: {:?}", other),
        };
        assert_eq!(second.get("likes"), Some(&json!(2)));
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_listen_stops_after_error_and_on_release() {
        let server = StubServer::start(|_| StubResponse::text(403, "denied"))
            .await
            .unwrap();
        let store = store_for(&server);

        let mut listener = store.listen("posts/p1").await.unwrap();
        assert!(matches!(listener.next().await, Some(DocumentEvent::Error(_))));
        assert!(listener.next().await.is_none());
    }

    #[test]
    fn test_filter_literal_escapes_strings() {
        assert_eq!(filter_literal(&json!("a\"b")), r#""a\"b""#);
        assert_eq!(filter_literal(&json!(1.5)), "1.5");
    }
}

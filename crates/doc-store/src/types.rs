use crate::Cursor;
use serde_json::{Map, Value};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Point-in-time view of one document. `fields == None` means the document
/// does not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    pub path: String,
    pub fields: Option<Fields>,
}

impl DocumentSnapshot {
    pub fn existing(path: impl Into<String>, id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            fields: Some(fields),
        }
    }

    pub fn missing(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            fields: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(field))
    }

    /// The document as exposed to callers: its fields plus `id`.
    /// `None` when the document does not exist.
    pub fn data(&self) -> Option<Value> {
        self.fields.as_ref().map(|fields| {
            let mut data = fields.clone();
            data.insert("id".to_string(), Value::String(self.id.clone()));
            Value::Object(data)
        })
    }

    /// Position of this document in a listing ordered by `order_field`.
    pub fn cursor(&self, order_field: &str) -> Cursor {
        Cursor::new(
            self.get(order_field).cloned().unwrap_or(Value::Null),
            self.id.clone(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    Ascending,
    #[default]
    Descending,
}

/// One page request against a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub collection: String,
    pub order_by: String,
    pub direction: OrderDirection,
    pub limit: usize,
    pub start_after: Option<Cursor>,
}

impl ListQuery {
    /// Newest-first by `createdAt`, unlimited.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            order_by: "createdAt".to_string(),
            direction: OrderDirection::Descending,
            limit: usize::MAX,
            start_after: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by = field.into();
        self.direction = direction;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    /// Merge into existing fields instead of replacing the document.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_data_includes_id() {
        let snap = DocumentSnapshot::existing("posts/p1", "p1", fields(json!({ "title": "hi" })));
        assert_eq!(snap.data(), Some(json!({ "title": "hi", "id": "p1" })));
    }

    #[test]
    fn test_missing_document_has_no_data() {
        let snap = DocumentSnapshot::missing("posts/p1", "p1");
        assert!(!snap.exists());
        assert_eq!(snap.data(), None);
    }

    #[test]
    fn test_cursor_uses_order_field() {
        let snap = DocumentSnapshot::existing("posts/p1", "p1", fields(json!({ "createdAt": 42 })));
        let cursor = snap.cursor("createdAt");
        assert_eq!(cursor.order_value, json!(42));
        assert_eq!(cursor.id, "p1");

        assert_eq!(snap.cursor("missing").order_value, Value::Null);
    }

    #[test]
    fn test_list_query_builder() {
        let query = ListQuery::new("posts")
            .order_by("score", OrderDirection::Ascending)
            .limit(8);
        assert_eq!(query.order_by, "score");
        assert_eq!(query.direction, OrderDirection::Ascending);
        assert_eq!(query.limit, 8);
        assert!(query.start_after.is_none());
    }
}

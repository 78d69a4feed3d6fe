//! Pagination cursors and the value ordering stores sort by.

use serde_json::Value;
use std::cmp::Ordering;

/// Opaque position in an ordered listing: the order field's value and the
/// document id that breaks ties.
#[derive(Debug, Clone, PartialEq)]
pub struct Cursor {
    pub order_value: Value,
    pub id: String,
}

impl Cursor {
    pub fn new(order_value: Value, id: impl Into<String>) -> Self {
        Self {
            order_value,
            id: id.into(),
        }
    }

    /// Ascending comparison of `(order_value, id)` against this cursor.
    pub fn compare(&self, order_value: &Value, id: &str) -> Ordering {
        compare_values(order_value, &self.order_value).then_with(|| id.cmp(&self.id))
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array <
/// object; same-typed values compare naturally.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

//! Collection queries: equality filters, a single order-by field, and
//! inclusive `start_at` / `end_at` cursors on that field.
//!
//! Values compare across types as `null < bool < number < string`; strings
//! compare by code point, so `end_at(prefix + '\u{f8ff}')` bounds a
//! "starts with" scan.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::Document;

/// Sorts after every character used in village, person and place names.
pub const PREFIX_UPPER_BOUND: char = '\u{f8ff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub equals: Vec<(String, Value)>,
    pub order_by: Option<OrderBy>,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            equals: Vec::new(),
            order_by: None,
            start_at: None,
            end_at: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    /// Inclusive lower cursor on the order-by field (upper when descending).
    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    /// Inclusive upper cursor on the order-by field (lower when descending).
    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    /// Restricts the order-by field to strings starting with `prefix`.
    pub fn starts_with(self, prefix: &str) -> Self {
        let upper = format!("{prefix}{PREFIX_UPPER_BOUND}");
        self.start_at(prefix).end_at(upper)
    }

    pub fn matches(&self, fields: &Map<String, Value>) -> bool {
        let equal = self
            .equals
            .iter()
            .all(|(field, expected)| lookup(fields, field).is_some_and(|v| v == expected));
        if !equal {
            return false;
        }

        let Some(order) = &self.order_by else {
            return true;
        };
        // Documents lacking the order field never appear in an ordered query.
        let Some(value) = lookup(fields, &order.field) else {
            return false;
        };

        let (low, high) = match order.direction {
            Direction::Ascending => (&self.start_at, &self.end_at),
            Direction::Descending => (&self.end_at, &self.start_at),
        };
        if let Some(low) = low {
            if compare_values(value, low) == Ordering::Less {
                return false;
            }
        }
        if let Some(high) = high {
            if compare_values(value, high) == Ordering::Greater {
                return false;
            }
        }
        true
    }

    /// Filters and orders `documents`. Ties on the order field fall back to
    /// document id so results are stable.
    pub fn apply(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = documents
            .into_iter()
            .filter(|doc| self.matches(&doc.fields))
            .collect();

        match &self.order_by {
            Some(order) => selected.sort_by(|a, b| {
                let left = lookup(&a.fields, &order.field).unwrap_or(&Value::Null);
                let right = lookup(&b.fields, &order.field).unwrap_or(&Value::Null);
                let ord = match order.direction {
                    Direction::Ascending => compare_values(left, right),
                    Direction::Descending => compare_values(right, left),
                };
                ord.then_with(|| a.id.cmp(&b.id))
            }),
            None => selected.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        selected
    }
}

/// Resolves a dotted field path (`location.address`) inside a document body.
pub fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
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

pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                let a = a.as_f64().unwrap_or(f64::NAN);
                let b = b.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ord = compare_values(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

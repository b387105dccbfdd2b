//! Request documents emitted by the compiler
//!
//! These are the wire shapes handed to a [`Connection`](crate::Connection).
//! Query and aggregation bodies stay as raw [`Value`] trees; the envelopes
//! around them are typed.

use crate::error::Result;
use crate::query::{Conflicts, Refresh};
use serde::Serialize;
use serde_json::{Map, Value};

/// A stored document: field name to JSON value
pub type Document = Map<String, Value>;

/// `_source` filtering: everything, or a list of fields
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SourceFilter {
    All(bool),
    Fields(Vec<String>),
}

impl SourceFilter {
    pub fn from_columns(columns: Option<&[String]>) -> Self {
        match columns {
            Some(columns) if !columns.is_empty() && !columns.iter().any(|c| c == "*") => {
                SourceFilter::Fields(columns.to_vec())
            }
            _ => SourceFilter::All(true),
        }
    }
}

/// Search request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchBody {
    #[serde(rename = "_source")]
    pub source: SourceFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl SearchBody {
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A compiled search: target index plus body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DslDocument {
    pub index: String,
    pub body: SearchBody,
    /// Scroll keep-alive, set when the search opens a cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll: Option<String>,
}

/// A compiled delete-by-query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteByQuery {
    pub index: String,
    pub body: SearchBody,
    /// Upper bound on deleted documents, from the builder's limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_docs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Conflicts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Refresh>,
}

/// Single-document lookup by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentGet {
    pub index: String,
    pub id: String,
}

/// Single-document index or partial update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRequest {
    pub index: String,
    pub id: String,
    pub body: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Merge `body` into the stored document instead of replacing it
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

/// One action/source pair of a bulk request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkOperation {
    pub action: Value,
    pub source: Document,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkRequest {
    pub operations: Vec<BulkOperation>,
}

impl BulkRequest {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Newline-delimited body for `_bulk`, terminated by a newline
    pub fn to_ndjson(&self) -> Result<String> {
        let mut out = String::new();
        for op in &self.operations {
            out.push_str(&serde_json::to_string(&op.action)?);
            out.push('\n');
            out.push_str(&serde_json::to_string(&op.source)?);
            out.push('\n');
        }
        Ok(out)
    }
}

/// Output of the write compiler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteRequest {
    Index(IndexRequest),
    Bulk(BulkRequest),
}

/// Merges `other` into `target` the way clause lists accumulate under AND.
///
/// Objects merge key by key, arrays concatenate, and two scalars meeting at
/// the same key become a two-element array.
pub fn deep_union(target: &mut Value, other: Value) {
    match (target, other) {
        (Value::Object(left), Value::Object(right)) => {
            for (key, value) in right {
                match left.get_mut(&key) {
                    Some(existing) => deep_union(existing, value),
                    None => {
                        left.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(left), Value::Array(right)) => left.extend(right),
        (Value::Array(left), value) => left.push(value),
        (slot, Value::Array(right)) => {
            let mut merged = vec![slot.take()];
            merged.extend(right);
            *slot = Value::Array(merged);
        }
        (slot, value) => {
            let previous = slot.take();
            *slot = Value::Array(vec![previous, value]);
        }
    }
}

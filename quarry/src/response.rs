//! Maps raw search responses into documents

use crate::dsl::Document;
use serde::Deserialize;
use serde_json::{Map, Value};

/// `hits.total` is a bare number on older clusters and `{value, relation}` on newer ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Object { value: u64 },
}

impl TotalHits {
    pub fn value(self) -> u64 {
        match self {
            TotalHits::Count(value) | TotalHits::Object { value } => value,
        }
    }
}

/// Documents of a search response plus the response itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    pub documents: Vec<Document>,
    raw: Value,
}

impl SearchResults {
    /// The untouched response body
    pub fn raw_response(&self) -> &Value {
        &self.raw
    }

    /// The `aggregations` object, empty when the response has none
    pub fn aggregations(&self) -> Value {
        self.raw
            .get("aggregations")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn total(&self) -> Option<u64> {
        total_hits(&self.raw)
    }

    /// Server-side duration in milliseconds
    pub fn took(&self) -> Option<u64> {
        self.raw.get("took").and_then(Value::as_u64)
    }

    pub fn scroll_id(&self) -> Option<&str> {
        self.raw.get("_scroll_id").and_then(Value::as_str)
    }
}

/// Total hit count of a search response, in either wire format
pub fn total_hits(response: &Value) -> Option<u64> {
    let total = response.get("hits")?.get("total")?;
    TotalHits::deserialize(total).ok().map(TotalHits::value)
}

/// Response processor
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseProcessor {
    include_inner_hits: bool,
}

impl ResponseProcessor {
    pub fn new(include_inner_hits: bool) -> Self {
        Self { include_inner_hits }
    }

    /// Turn a search or get response into documents.
    ///
    /// A get response (`found: true`) yields a single document; a search
    /// response yields one document per entry of `hits.hits`.
    pub fn process_select(&self, response: Value) -> SearchResults {
        let documents = if response.get("found").and_then(Value::as_bool) == Some(true) {
            self.document_from_hit(&response).into_iter().collect()
        } else {
            hits(&response)
                .iter()
                .filter_map(|hit| self.document_from_hit(hit))
                .collect()
        };

        SearchResults {
            documents,
            raw: response,
        }
    }

    /// `_source` fields plus `id`, and grouped inner hits when enabled
    pub fn document_from_hit(&self, hit: &Value) -> Option<Document> {
        let hit = hit.as_object()?;
        let mut document = match hit.get("_source") {
            Some(Value::Object(source)) => source.clone(),
            _ => Map::new(),
        };

        if let Some(id) = hit.get("_id") {
            document.insert("id".to_string(), id.clone());
        }

        if self.include_inner_hits {
            if let Some(Value::Object(inner)) = hit.get("inner_hits") {
                let mut grouped = Map::new();
                for (name, result) in inner {
                    let entries: Vec<Value> = hits(result).iter().map(inner_hit_entry).collect();
                    grouped.insert(name.clone(), Value::Array(entries));
                }
                document.insert("inner_hits".to_string(), Value::Object(grouped));
            }
        }

        Some(document)
    }
}

fn hits(response: &Value) -> &[Value] {
    response
        .get("hits")
        .and_then(|hits| hits.get("hits"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn inner_hit_entry(hit: &Value) -> Value {
    let mut entry = Map::new();
    if let Some(id) = hit.get("_id") {
        entry.insert("_id".to_string(), id.clone());
    }
    if let Some(Value::Object(source)) = hit.get("_source") {
        for (key, value) in source {
            entry.insert(key.clone(), value.clone());
        }
    }
    Value::Object(entry)
}

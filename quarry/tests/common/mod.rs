//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use quarry::config::CompilerConfig;
use quarry::dsl::{BulkRequest, DeleteByQuery, DocumentGet, DslDocument, IndexRequest};
use quarry::{Client, Connection, Document, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A request as seen by the connection
#[derive(Debug, Clone)]
pub enum Recorded {
    Search(DslDocument),
    Scroll(String),
    ClearScroll(String),
    Get(DocumentGet),
    DeleteByQuery(DeleteByQuery),
    Index(IndexRequest),
    Bulk(BulkRequest),
}

/// In-memory connection that records requests and replays queued responses.
///
/// When the queue is empty every call answers with an empty search response.
#[derive(Default)]
pub struct RecordingConnection {
    requests: Mutex<Vec<Recorded>>,
    responses: Mutex<VecDeque<Option<Value>>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: Value) {
        self.responses.lock().unwrap().push_back(Some(response));
    }

    /// Queue a "not found" answer for `get`
    pub fn respond_missing(&self) {
        self.responses.lock().unwrap().push_back(None);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn searches(&self) -> Vec<DslDocument> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Search(search) => Some(search),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: Recorded) -> Option<Value> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Some(empty_response()))
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn search(&self, request: &DslDocument) -> Result<Value> {
        Ok(self.record(Recorded::Search(request.clone())).unwrap_or_default())
    }

    async fn scroll(&self, scroll_id: &str) -> Result<Value> {
        Ok(self
            .record(Recorded::Scroll(scroll_id.to_string()))
            .unwrap_or_default())
    }

    /// Recorded without consuming a queued response
    async fn clear_scroll(&self, scroll_id: &str) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push(Recorded::ClearScroll(scroll_id.to_string()));
        Ok(serde_json::json!({"succeeded": true}))
    }

    async fn get(&self, request: &DocumentGet) -> Result<Option<Value>> {
        Ok(self.record(Recorded::Get(request.clone())))
    }

    async fn delete_by_query(&self, request: &DeleteByQuery) -> Result<Value> {
        Ok(self
            .record(Recorded::DeleteByQuery(request.clone()))
            .unwrap_or_default())
    }

    async fn index(&self, request: &IndexRequest) -> Result<Value> {
        Ok(self.record(Recorded::Index(request.clone())).unwrap_or_default())
    }

    async fn bulk(&self, request: &BulkRequest) -> Result<Value> {
        Ok(self.record(Recorded::Bulk(request.clone())).unwrap_or_default())
    }
}

pub fn client(connection: Arc<RecordingConnection>) -> Client {
    Client::new(connection, CompilerConfig::default())
}

pub fn empty_response() -> Value {
    serde_json::json!({"took": 1, "hits": {"total": {"value": 0}, "hits": []}})
}

/// Search response with one hit per `(id, source)` pair
pub fn hits_response(total: u64, hits: &[(&str, Value)]) -> Value {
    let hits: Vec<Value> = hits
        .iter()
        .map(|(id, source)| serde_json::json!({"_id": id, "_source": source}))
        .collect();
    serde_json::json!({"took": 3, "hits": {"total": {"value": total}, "hits": hits}})
}

pub fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

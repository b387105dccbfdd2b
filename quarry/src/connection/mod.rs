//! Transport seam between the query builder and the search cluster
//!
//! [`QueryBuilder`](crate::QueryBuilder) only ever talks to a
//! [`Connection`]; [`HttpConnection`] is the production implementation and
//! tests substitute an in-memory one.

mod http;

pub use http::HttpConnection;

use crate::dsl::{BulkRequest, DeleteByQuery, DocumentGet, DslDocument, IndexRequest};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Executes compiled requests and returns raw response bodies
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a search; opens a scroll when `request.scroll` is set
    async fn search(&self, request: &DslDocument) -> Result<Value>;

    /// Fetch the next page of an open scroll
    async fn scroll(&self, scroll_id: &str) -> Result<Value>;

    /// Release an open scroll before its keep-alive runs out
    async fn clear_scroll(&self, scroll_id: &str) -> Result<Value>;

    /// Fetch one document; `None` when it does not exist
    async fn get(&self, request: &DocumentGet) -> Result<Option<Value>>;

    async fn delete_by_query(&self, request: &DeleteByQuery) -> Result<Value>;

    /// Index or partially update one document
    async fn index(&self, request: &IndexRequest) -> Result<Value>;

    async fn bulk(&self, request: &BulkRequest) -> Result<Value>;
}

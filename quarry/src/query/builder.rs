//! Query builder bound to a connection
//!
//! ```ignore
//! let client = Client::from_config(&config)?;
//! let docs = client
//!     .query("posts")
//!     .where_eq("status", "published")
//!     .or_where_eq("featured", true)
//!     .order_by("published_at", Direction::Desc)
//!     .limit(20)
//!     .get()
//!     .await?;
//! ```

use super::clause::{Direction, OrderSpec};
use super::state::{QueryClauses, QueryState};
use crate::compiler::Compiler;
use crate::config::{CompilerConfig, Config};
use crate::connection::{Connection, HttpConnection};
use crate::dsl::{Document, DslDocument, WriteRequest};
use crate::error::{Error, Result};
use crate::response::{total_hits, ResponseProcessor, SearchResults};
use async_stream::try_stream;
use futures::Stream;
use serde_json::Value;
use std::sync::Arc;

/// Keep-alive of scroll cursors
pub const SCROLL_KEEP_ALIVE: &str = "1m";
/// Page size requested per scroll round-trip
pub const CURSOR_PAGE_SIZE: usize = 100;

/// Entry point: a connection plus a compiler, handing out builders
#[derive(Clone)]
pub struct Client {
    connection: Arc<dyn Connection>,
    compiler: Arc<Compiler>,
}

impl Client {
    pub fn new(connection: Arc<dyn Connection>, config: CompilerConfig) -> Self {
        Self {
            connection,
            compiler: Arc::new(Compiler::new(config)),
        }
    }

    /// HTTP client built from a loaded [`Config`]
    pub fn from_config(config: &Config) -> Result<Self> {
        let connection = HttpConnection::new(&config.connection)?;
        tracing::info!(url = %connection.url(), "connecting");
        Ok(Self::new(Arc::new(connection), config.compiler.clone()))
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn query(&self, collection: impl Into<String>) -> QueryBuilder {
        self.query_state(QueryState::new(collection))
    }

    /// Builder over a previously built or deserialized state
    pub fn query_state(&self, state: QueryState) -> QueryBuilder {
        QueryBuilder::from_state(self.connection.clone(), self.compiler.clone(), state)
    }
}

#[derive(Debug, Clone)]
struct CachedResults {
    offset: Option<usize>,
    results: SearchResults,
}

/// Fluent query over one collection.
///
/// Results of the last executed search are cached until the offset
/// changes, so `get`, `aggregation_results`, `count_for_pagination` and
/// `search_duration` on the same builder share one round-trip.
#[derive(Clone)]
pub struct QueryBuilder {
    connection: Arc<dyn Connection>,
    compiler: Arc<Compiler>,
    state: QueryState,
    cache: Option<CachedResults>,
}

impl QueryClauses for QueryBuilder {
    fn state(&self) -> &QueryState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }
}

impl QueryBuilder {
    pub fn from_state(
        connection: Arc<dyn Connection>,
        compiler: Arc<Compiler>,
        state: QueryState,
    ) -> Self {
        Self {
            connection,
            compiler,
            state,
            cache: None,
        }
    }

    pub fn into_state(self) -> QueryState {
        self.state
    }

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn limit(&mut self, limit: usize) -> &mut Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn offset(&mut self, offset: usize) -> &mut Self {
        self.state.offset = Some(offset);
        self
    }

    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.state.orders.push(OrderSpec::new(column, direction));
        self
    }

    pub fn order_by_spec(&mut self, order: OrderSpec) -> &mut Self {
        self.state.orders.push(order);
        self
    }

    /// Sort by distance from `coordinates` (`km` and `plane` by default)
    pub fn order_by_geo_distance(
        &mut self,
        column: impl Into<String>,
        coordinates: Value,
        direction: Direction,
    ) -> &mut Self {
        self.state
            .orders
            .push(OrderSpec::geo_distance(column, coordinates, direction));
        self
    }

    pub fn routing(&mut self, routing: impl Into<String>) -> &mut Self {
        self.state.options.routing = Some(routing.into());
        self
    }

    pub fn parent_id(&mut self, parent_id: impl Into<String>) -> &mut Self {
        self.state.options.parent_id = Some(parent_id.into());
        self
    }

    /// Group inner hits of relationship clauses into each document
    pub fn with_inner_hits(&mut self) -> &mut Self {
        self.state.options.include_inner_hits = true;
        self
    }

    /// Conflict handling for [`delete`](Self::delete): `abort` or `proceed`
    pub fn on_conflicts(&mut self, conflicts: &str) -> Result<&mut Self> {
        self.state.options.conflicts = Some(conflicts.parse()?);
        Ok(self)
    }

    /// Refresh behaviour for [`delete`](Self::delete): `true` or `false`
    pub fn with_refresh(&mut self, refresh: &str) -> Result<&mut Self> {
        self.state.options.refresh = Some(refresh.parse()?);
        Ok(self)
    }

    /// The search request this builder would send
    pub fn to_dsl(&self) -> Result<DslDocument> {
        self.compiler.compile_select(&self.state)
    }

    pub async fn get(&mut self) -> Result<Vec<Document>> {
        self.get_columns(&["*"]).await
    }

    /// Run the search with a projection, unless one was already selected.
    /// The builder's own projection is left untouched.
    pub async fn get_columns(&mut self, columns: &[&str]) -> Result<Vec<Document>> {
        let original = self.state.columns.clone();
        if original.is_none() {
            self.state.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        }
        let documents = self.results().await.map(|r| r.documents.clone());
        self.state.columns = original;
        documents
    }

    pub async fn first(&self) -> Result<Option<Document>> {
        let mut query = self.clone();
        query.cache = None;
        query.limit(1);
        Ok(query.get().await?.into_iter().next())
    }

    /// Fetch one document by id, bypassing the clause lists
    pub async fn document(&self, id: impl Into<String>) -> Result<Option<Document>> {
        let request = self.compiler.compile_document_get(&self.state, id);
        metrics::counter!("quarry_requests_total", "op" => "get").increment(1);
        let Some(response) = self.connection.get(&request).await? else {
            tracing::debug!(index = %request.index, id = %request.id, "document not found");
            return Ok(None);
        };
        let processor = ResponseProcessor::new(self.state.options.include_inner_hits);
        Ok(processor.process_select(response).documents.into_iter().next())
    }

    pub async fn aggregation_results(&mut self) -> Result<Value> {
        Ok(self.results().await?.aggregations())
    }

    /// Total hit count, from the cached search when there is one
    pub async fn count_for_pagination(&mut self) -> Result<u64> {
        if let Some(total) = self.cache.as_ref().and_then(|c| c.results.total()) {
            return Ok(total);
        }

        let mut state = self.state.clone();
        state.columns = Some(vec!["_id".to_string()]);
        state.orders.clear();
        state.aggregations.clear();
        state.limit = Some(1);
        state.offset = None;

        let request = self.compiler.compile_select(&state)?;
        metrics::counter!("quarry_requests_total", "op" => "count").increment(1);
        let response = self.connection.search(&request).await?;
        total_hits(&response)
            .ok_or_else(|| Error::MalformedResponse("response has no hits.total".to_string()))
    }

    /// Server-side duration of the search in milliseconds
    pub async fn search_duration(&mut self) -> Result<Option<u64>> {
        Ok(self.results().await?.took())
    }

    /// Stream every matching document through a scroll cursor.
    ///
    /// Pages of [`CURSOR_PAGE_SIZE`] are fetched until the cluster runs out
    /// of hits or the builder's limit is reached; either way the scroll is
    /// cleared. A stream dropped before then leaves the scroll to expire
    /// after [`SCROLL_KEEP_ALIVE`].
    pub fn cursor(&self) -> impl Stream<Item = Result<Document>> + '_ {
        try_stream! {
            let mut request = self.compiler.compile_select(&self.state)?;
            request.scroll = Some(SCROLL_KEEP_ALIVE.to_string());
            request.body.size = Some(CURSOR_PAGE_SIZE);
            request.body.from = None;

            let limit = self.state.limit;
            let reached = |yielded: usize| limit.is_some_and(|limit| yielded >= limit);
            let processor = ResponseProcessor::new(self.state.options.include_inner_hits);
            metrics::counter!("quarry_requests_total", "op" => "scroll").increment(1);
            let mut response = self.connection.search(&request).await?;
            let mut yielded = 0usize;

            loop {
                let page = processor.process_select(response);
                let scroll_id = page.scroll_id().map(str::to_string);
                if page.documents.is_empty() {
                    self.release_scroll(scroll_id.as_deref()).await;
                    break;
                }

                for document in page.documents {
                    if reached(yielded) {
                        break;
                    }
                    yielded += 1;
                    yield document;
                }
                if reached(yielded) {
                    self.release_scroll(scroll_id.as_deref()).await;
                    break;
                }

                match scroll_id {
                    Some(scroll_id) => {
                        tracing::debug!(yielded, "fetching next scroll page");
                        metrics::counter!("quarry_requests_total", "op" => "scroll").increment(1);
                        response = self.connection.scroll(&scroll_id).await?;
                    }
                    None => break,
                }
            }
        }
    }

    /// Clear a finished scroll; failures only cost the keep-alive
    async fn release_scroll(&self, scroll_id: Option<&str>) {
        let Some(scroll_id) = scroll_id else {
            return;
        };
        metrics::counter!("quarry_requests_total", "op" => "clear_scroll").increment(1);
        if let Err(e) = self.connection.clear_scroll(scroll_id).await {
            tracing::warn!(error = %e, "failed to clear scroll");
        }
    }

    /// Index one document; `child_documents` are written in the same request
    pub async fn insert(&self, document: Document) -> Result<Value> {
        let request = self.compiler.compile_index(&self.state, document);
        self.execute_write(request).await
    }

    /// Index a batch of documents through one bulk request
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<Value> {
        if documents.is_empty() {
            return Ok(Value::Null);
        }
        let request = self.compiler.compile_bulk(&self.state, documents);
        self.execute_write(WriteRequest::Bulk(request)).await
    }

    /// Partially update the document identified by `_id`/`id` in `values`
    pub async fn update(&self, values: Document) -> Result<Value> {
        let request = self.compiler.compile_update(&self.state, values);
        self.execute_write(WriteRequest::Index(request)).await
    }

    /// Delete every matching document; true when something was deleted
    pub async fn delete(&self) -> Result<bool> {
        let request = self.compiler.compile_delete(&self.state)?;
        tracing::debug!(index = %request.index, body = ?request.body, "executing delete by query");
        metrics::counter!("quarry_requests_total", "op" => "delete").increment(1);
        let response = self.connection.delete_by_query(&request).await?;
        let deleted = response.get("deleted").and_then(Value::as_u64).unwrap_or(0);
        tracing::info!(index = %request.index, deleted, "delete by query finished");
        Ok(deleted > 0)
    }

    /// Delete a single document by id
    pub async fn delete_by_id(&self, id: impl Into<String>) -> Result<bool> {
        let id: String = id.into();
        let mut query = self.clone();
        query.where_eq("_id", id);
        query.delete().await
    }

    async fn results(&mut self) -> Result<&SearchResults> {
        let offset = self.state.offset;
        let cached = match self.cache.take() {
            Some(cache) if cache.offset == offset => {
                metrics::counter!("quarry_cache_hits_total").increment(1);
                cache
            }
            _ => CachedResults {
                offset,
                results: self.run_search().await?,
            },
        };
        Ok(&self.cache.insert(cached).results)
    }

    async fn run_search(&self) -> Result<SearchResults> {
        let request = self.compiler.compile_select(&self.state)?;
        tracing::debug!(index = %request.index, body = ?request.body, "executing search");
        metrics::counter!("quarry_requests_total", "op" => "search").increment(1);
        let response = self.connection.search(&request).await?;
        let processor = ResponseProcessor::new(self.state.options.include_inner_hits);
        Ok(processor.process_select(response))
    }

    async fn execute_write(&self, request: WriteRequest) -> Result<Value> {
        let response = match &request {
            WriteRequest::Index(index) => {
                tracing::debug!(
                    index = %index.index,
                    id = %index.id,
                    partial = index.partial,
                    "sending index request"
                );
                metrics::counter!("quarry_requests_total", "op" => "index").increment(1);
                self.connection.index(index).await?
            }
            WriteRequest::Bulk(bulk) => {
                tracing::debug!(operations = bulk.len(), "sending bulk request");
                metrics::counter!("quarry_requests_total", "op" => "bulk").increment(1);
                self.connection.bulk(bulk).await?
            }
        };

        if response.get("errors").and_then(Value::as_bool) == Some(true) {
            let err = Error::from_bulk_response(&response);
            tracing::warn!(error = %err, "write reported item failures");
            return Err(err);
        }

        match &request {
            WriteRequest::Index(index) => tracing::info!(
                index = %index.index,
                id = %index.id,
                result = response.get("result").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                "document written"
            ),
            WriteRequest::Bulk(bulk) => {
                tracing::info!(operations = bulk.len(), "bulk write finished")
            }
        }
        Ok(response)
    }
}

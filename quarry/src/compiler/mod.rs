//! Compiles a [`QueryState`] into search-engine request documents
//!
//! The compiler is pure: it never talks to the cluster. Read requests go
//! through [`Compiler::compile_select`] and [`Compiler::compile_delete`],
//! writes through the functions in `write.rs`.

mod aggregations;
mod clauses;
mod write;

use crate::config::CompilerConfig;
use crate::dsl::{DeleteByQuery, DocumentGet, DslDocument, SearchBody, SourceFilter};
use crate::error::Result;
use crate::query::{FieldValue, OrderKind, OrderSpec, QueryState};
use serde_json::{json, Map, Value};
use std::fmt::Write as _;

pub use clauses::CompiledContexts;

/// Default unit of geo-distance sorts
pub const DEFAULT_DISTANCE_UNIT: &str = "km";
/// Default distance computation of geo-distance sorts
pub const DEFAULT_DISTANCE_TYPE: &str = "plane";

/// Query compiler
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Physical index name for a collection
    pub fn index_name(&self, collection: &str) -> String {
        format!("{}{}", collection, self.config.index_suffix)
    }

    /// Compile a search request
    pub fn compile_select(&self, state: &QueryState) -> Result<DslDocument> {
        let body = self.compile_body(state)?;
        tracing::debug!(collection = %state.collection, "compiled search request");
        Ok(DslDocument {
            index: self.index_name(&state.collection),
            body,
            scroll: None,
        })
    }

    /// Compile a delete-by-query request.
    ///
    /// The limit travels as `max_docs`; sort, offset and aggregations are
    /// not sent.
    pub fn compile_delete(&self, state: &QueryState) -> Result<DeleteByQuery> {
        let mut body = self.compile_body(state)?;
        body.sort = None;
        body.from = None;
        body.size = None;
        body.aggregations = None;
        Ok(DeleteByQuery {
            index: self.index_name(&state.collection),
            body,
            max_docs: state.limit,
            conflicts: state.options.conflicts,
            refresh: state.options.refresh,
        })
    }

    pub fn compile_document_get(&self, state: &QueryState, id: impl Into<String>) -> DocumentGet {
        DocumentGet {
            index: self.index_name(&state.collection),
            id: id.into(),
        }
    }

    fn compile_body(&self, state: &QueryState) -> Result<SearchBody> {
        let contexts = self.compile_contexts(&state.collection, state)?;

        let query = match contexts.filter {
            Some(filter) => Some(attach_filter(contexts.query, filter)),
            None => contexts.query,
        };

        let aggregations = if state.aggregations.is_empty() {
            None
        } else {
            Some(self.compile_aggregations(&state.collection, &state.aggregations)?)
        };

        let sort = if state.orders.is_empty() {
            None
        } else {
            Some(
                state
                    .orders
                    .iter()
                    .map(|order| self.compile_order(&state.collection, order))
                    .collect(),
            )
        };

        Ok(SearchBody {
            source: SourceFilter::from_columns(state.columns.as_deref()),
            query,
            post_filter: contexts.post_filter,
            aggregations,
            sort,
            from: state.offset.filter(|offset| *offset > 0),
            size: state.limit,
        })
    }

    fn compile_order(&self, collection: &str, order: &OrderSpec) -> Value {
        let column = strip_collection(collection, &order.column);
        match &order.kind {
            OrderKind::Basic { missing, mode } => {
                let mut spec = Map::new();
                spec.insert("order".to_string(), json!(order.direction.as_str()));
                if let Some(missing) = missing {
                    spec.insert("missing".to_string(), missing.clone());
                }
                if let Some(mode) = mode {
                    spec.insert("mode".to_string(), json!(mode));
                }
                json!({ column: spec })
            }
            OrderKind::GeoDistance {
                coordinates,
                unit,
                distance_type,
            } => json!({
                "_geo_distance": {
                    column: coordinates,
                    "order": order.direction.as_str(),
                    "unit": unit.as_deref().unwrap_or(DEFAULT_DISTANCE_UNIT),
                    "distance_type": distance_type.as_deref().unwrap_or(DEFAULT_DISTANCE_TYPE),
                }
            }),
        }
    }

    /// Render a clause value, formatting timestamps with the configured pattern
    pub fn render_value(&self, value: &FieldValue) -> Value {
        match value {
            FieldValue::Json(value) => value.clone(),
            FieldValue::Date(date) => {
                let mut out = String::new();
                if write!(out, "{}", date.format(&self.config.date_format)).is_err() {
                    tracing::warn!(
                        format = %self.config.date_format,
                        "invalid date format, falling back to RFC 3339"
                    );
                    out = date.to_rfc3339();
                }
                Value::String(out)
            }
        }
    }
}

/// Drops a leading `<collection>.` from a column name
pub(crate) fn strip_collection<'a>(collection: &str, column: &'a str) -> &'a str {
    if collection.is_empty() {
        return column;
    }
    column
        .strip_prefix(collection)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(column)
}

/// Combine a scoring query with a filter tree.
///
/// A plain `bool` query without `should` takes the filter directly; anything
/// else is wrapped so OR semantics of the query survive.
pub(crate) fn attach_filter(query: Option<Value>, filter: Value) -> Value {
    match query {
        None => json!({"bool": {"filter": filter}}),
        Some(Value::Object(mut map))
            if map.len() == 1
                && map
                    .get("bool")
                    .and_then(Value::as_object)
                    .is_some_and(|b| !b.contains_key("should") && !b.contains_key("filter")) =>
        {
            if let Some(Value::Object(bool_query)) = map.get_mut("bool") {
                bool_query.insert("filter".to_string(), filter);
            }
            Value::Object(map)
        }
        Some(other) => json!({"bool": {"must": [other], "filter": filter}}),
    }
}

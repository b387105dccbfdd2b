//! Fluent query builder for Elasticsearch-compatible search clusters
//!
//! Queries are described with a chainable builder, kept as plain data in a
//! [`QueryState`], and compiled into query DSL documents by the
//! [`Compiler`]. A [`Connection`] executes them; [`HttpConnection`] talks to
//! a real cluster over HTTP.
//!
//! # Clauses
//!
//! - equality, comparison, `like`, `exists` and null checks
//! - `in` / `not in`, between / not between, date and date-part comparisons
//! - geo distance and bounding box
//! - nested documents, groups and negated sub-queries
//! - `has_parent` / `has_child` / `parent_id`
//! - full-text search, prefix, script and function score
//!
//! Clauses combine left to right under AND/OR and can be placed in the
//! query, filter or post-filter context.
//!
//! # Aggregations
//!
//! terms, date_histogram, cardinality, composite, date_range, exists,
//! missing, nested, reverse_nested, children, filter and sum/avg/max/min,
//! each with optional sub-aggregations.

pub mod compiler;
pub mod config;
pub mod connection;
pub mod dsl;
pub mod error;
pub mod query;
pub mod response;

pub use compiler::Compiler;
pub use config::Config;
pub use connection::{Connection, HttpConnection};
pub use dsl::{Document, DslDocument, WriteRequest};
pub use error::{Error, Result};
pub use query::{
    AggregationKind, AggregationNode, Boolean, Client, Direction, FieldValue, Operator,
    QueryBuilder, QueryClauses, QueryState,
};
pub use response::{ResponseProcessor, SearchResults};

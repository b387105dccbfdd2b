//! Query state and the fluent clause-building trait

use super::aggregation::{AggregationKind, AggregationNode};
use super::clause::{
    Boolean, DatePart, FieldValue, Operator, Relation, SearchOptions, WhereClause, WhereKind,
};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

/// Version-conflict handling for delete-by-query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conflicts {
    Abort,
    Proceed,
}

impl Conflicts {
    pub fn as_str(self) -> &'static str {
        match self {
            Conflicts::Abort => "abort",
            Conflicts::Proceed => "proceed",
        }
    }
}

impl FromStr for Conflicts {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Conflicts::Abort),
            "proceed" => Ok(Conflicts::Proceed),
            _ => Err(Error::InvalidOption {
                option: "conflict",
                value: s.to_string(),
                allowed: vec!["abort", "proceed"],
            }),
        }
    }
}

/// Refresh behaviour for delete-by-query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Refresh {
    False,
    True,
}

impl Refresh {
    pub fn as_str(self) -> &'static str {
        match self {
            Refresh::False => "false",
            Refresh::True => "true",
        }
    }
}

impl From<bool> for Refresh {
    fn from(value: bool) -> Self {
        if value {
            Refresh::True
        } else {
            Refresh::False
        }
    }
}

impl FromStr for Refresh {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "false" => Ok(Refresh::False),
            "true" => Ok(Refresh::True),
            _ => Err(Error::InvalidOption {
                option: "refresh",
                value: s.to_string(),
                allowed: vec!["false", "true"],
            }),
        }
    }
}

/// Request-level options that are not clauses
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Conflicts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh: Option<Refresh>,
    pub include_inner_hits: bool,
}

/// Everything the compiler needs to emit a request for one collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryState {
    pub collection: String,
    pub wheres: Vec<WhereClause>,
    pub filters: Vec<WhereClause>,
    pub post_filters: Vec<WhereClause>,
    pub aggregations: Vec<AggregationNode>,
    pub orders: Vec<super::clause::OrderSpec>,
    pub columns: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub options: QueryOptions,
}

impl QueryState {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.wheres.is_empty() && self.filters.is_empty() && self.post_filters.is_empty()
    }

    /// Parse a stored query description; JSON is valid YAML, so both work
    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(source)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn sub_query<F: FnOnce(&mut QueryState)>(collection: &str, build: F) -> Box<QueryState> {
    let mut state = QueryState::new(collection);
    build(&mut state);
    Box::new(state)
}

/// Fluent clause methods shared by [`QueryState`] and
/// [`QueryBuilder`](super::QueryBuilder).
///
/// Nested queries (groups, nested documents, relationships, negation) take
/// a closure that fills a fresh [`QueryState`] for the same collection.
pub trait QueryClauses: Sized {
    fn state(&self) -> &QueryState;
    fn state_mut(&mut self) -> &mut QueryState;

    fn push_where(&mut self, clause: WhereClause) -> &mut Self {
        self.state_mut().wheres.push(clause);
        self
    }

    fn push_kind(&mut self, kind: WhereKind, boolean: Boolean) -> &mut Self {
        self.push_where(WhereClause::new(kind).with_boolean(boolean))
    }

    fn where_op(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> &mut Self {
        self.push_kind(basic(column, operator, value), Boolean::And)
    }

    fn or_where_op(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> &mut Self {
        self.push_kind(basic(column, operator, value), Boolean::Or)
    }

    fn where_eq(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.where_op(column, Operator::Eq, value)
    }

    fn or_where_eq(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.or_where_op(column, Operator::Eq, value)
    }

    fn where_ne(&mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.where_op(column, Operator::Ne, value)
    }

    fn where_like(&mut self, column: impl Into<String>, pattern: impl Into<String>) -> &mut Self {
        let pattern: String = pattern.into();
        self.where_op(column, Operator::Like, pattern)
    }

    fn where_exists(&mut self, column: impl Into<String>) -> &mut Self {
        self.where_op(column, Operator::Exists, true)
    }

    fn where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let kind = WhereKind::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self.push_kind(kind, Boolean::And)
    }

    fn or_where_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let kind = WhereKind::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self.push_kind(kind, Boolean::Or)
    }

    fn where_not_in<I, V>(&mut self, column: impl Into<String>, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let kind = WhereKind::NotIn {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        };
        self.push_kind(kind, Boolean::And)
    }

    fn where_between(
        &mut self,
        column: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> &mut Self {
        self.push_kind(between(column, low, high, false), Boolean::And)
    }

    fn or_where_between(
        &mut self,
        column: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> &mut Self {
        self.push_kind(between(column, low, high, false), Boolean::Or)
    }

    fn where_not_between(
        &mut self,
        column: impl Into<String>,
        low: impl Into<FieldValue>,
        high: impl Into<FieldValue>,
    ) -> &mut Self {
        self.push_kind(between(column, low, high, true), Boolean::And)
    }

    fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_kind(
            WhereKind::Null {
                column: column.into(),
            },
            Boolean::And,
        )
    }

    fn or_where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_kind(
            WhereKind::Null {
                column: column.into(),
            },
            Boolean::Or,
        )
    }

    fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_kind(
            WhereKind::NotNull {
                column: column.into(),
            },
            Boolean::And,
        )
    }

    fn or_where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push_kind(
            WhereKind::NotNull {
                column: column.into(),
            },
            Boolean::Or,
        )
    }

    /// Date comparison; `=` matches the whole instant as a closed range
    fn where_date(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> &mut Self {
        let kind = WhereKind::Date {
            column: column.into(),
            operator,
            value: value.into(),
        };
        self.push_kind(kind, Boolean::And)
    }

    fn or_where_date(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> &mut Self {
        let kind = WhereKind::Date {
            column: column.into(),
            operator,
            value: value.into(),
        };
        self.push_kind(kind, Boolean::Or)
    }

    fn where_date_part(
        &mut self,
        column: impl Into<String>,
        part: DatePart,
        operator: Operator,
        value: i64,
    ) -> &mut Self {
        let kind = WhereKind::DatePart {
            column: column.into(),
            part,
            operator,
            value,
        };
        self.push_kind(kind, Boolean::And)
    }

    fn where_year(&mut self, column: impl Into<String>, operator: Operator, value: i64) -> &mut Self {
        self.where_date_part(column, DatePart::Year, operator, value)
    }

    fn where_month(&mut self, column: impl Into<String>, operator: Operator, value: i64) -> &mut Self {
        self.where_date_part(column, DatePart::Month, operator, value)
    }

    fn where_day(&mut self, column: impl Into<String>, operator: Operator, value: i64) -> &mut Self {
        self.where_date_part(column, DatePart::Day, operator, value)
    }

    fn where_weekday(
        &mut self,
        column: impl Into<String>,
        operator: Operator,
        value: i64,
    ) -> &mut Self {
        self.where_date_part(column, DatePart::Weekday, operator, value)
    }

    /// Points within `distance` (e.g. `"10km"`) of `location`
    fn where_geo_distance(
        &mut self,
        column: impl Into<String>,
        location: Value,
        distance: impl Into<String>,
    ) -> &mut Self {
        let kind = WhereKind::GeoDistance {
            column: column.into(),
            location,
            distance: distance.into(),
        };
        self.push_kind(kind, Boolean::And)
    }

    fn where_geo_bounds_in(&mut self, column: impl Into<String>, bounds: Value) -> &mut Self {
        let kind = WhereKind::GeoBoundsIn {
            column: column.into(),
            bounds,
        };
        self.push_kind(kind, Boolean::And)
    }

    fn where_nested_doc<F>(&mut self, column: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        let query = sub_query(&self.state().collection, build);
        let kind = WhereKind::NestedDoc {
            column: column.into(),
            query,
            negate: false,
        };
        self.push_kind(kind, Boolean::And)
    }

    fn where_not_nested_doc<F>(&mut self, column: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        let query = sub_query(&self.state().collection, build);
        let kind = WhereKind::NestedDoc {
            column: column.into(),
            query,
            negate: true,
        };
        self.push_kind(kind, Boolean::And)
    }

    /// Parenthesised group of clauses
    fn where_group<F: FnOnce(&mut QueryState)>(&mut self, build: F) -> &mut Self {
        let query = sub_query(&self.state().collection, build);
        self.push_kind(WhereKind::Group { query }, Boolean::And)
    }

    fn or_where_group<F: FnOnce(&mut QueryState)>(&mut self, build: F) -> &mut Self {
        let query = sub_query(&self.state().collection, build);
        self.push_kind(WhereKind::Group { query }, Boolean::Or)
    }

    /// Excludes documents matching the sub-query
    fn where_not<F: FnOnce(&mut QueryState)>(&mut self, build: F) -> &mut Self {
        let query = sub_query(&self.state().collection, build);
        self.push_kind(WhereKind::Not { query }, Boolean::And)
    }

    fn where_relationship<F>(
        &mut self,
        relation: Relation,
        document_type: impl Into<String>,
        boolean: Boolean,
        build: F,
    ) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        let query = sub_query(&self.state().collection, build);
        let kind = WhereKind::Relationship {
            relation,
            document_type: document_type.into(),
            query,
        };
        self.push_kind(kind, boolean)
    }

    fn where_parent<F>(&mut self, document_type: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        self.where_relationship(Relation::Parent, document_type, Boolean::And, build)
    }

    fn or_where_parent<F>(&mut self, document_type: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        self.where_relationship(Relation::Parent, document_type, Boolean::Or, build)
    }

    fn where_child<F>(&mut self, document_type: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        self.where_relationship(Relation::Child, document_type, Boolean::And, build)
    }

    fn or_where_child<F>(&mut self, document_type: impl Into<String>, build: F) -> &mut Self
    where
        F: FnOnce(&mut QueryState),
    {
        self.where_relationship(Relation::Child, document_type, Boolean::Or, build)
    }

    fn where_parent_id(
        &mut self,
        parent_type: impl Into<String>,
        id: impl Into<FieldValue>,
    ) -> &mut Self {
        let kind = WhereKind::ParentId {
            parent_type: parent_type.into(),
            id: id.into(),
        };
        self.push_kind(kind, Boolean::And)
    }

    /// Script query; `options` is merged next to `source` (params, lang)
    fn where_script(&mut self, source: impl Into<String>, options: Map<String, Value>) -> &mut Self {
        let kind = WhereKind::Script {
            source: source.into(),
            options,
        };
        self.push_kind(kind, Boolean::And)
    }

    fn or_where_script(
        &mut self,
        source: impl Into<String>,
        options: Map<String, Value>,
    ) -> &mut Self {
        let kind = WhereKind::Script {
            source: source.into(),
            options,
        };
        self.push_kind(kind, Boolean::Or)
    }

    /// Full-text search over every field
    fn search(&mut self, text: impl Into<String>) -> &mut Self {
        self.search_with(text, SearchOptions::default(), Boolean::And)
    }

    fn search_with(
        &mut self,
        text: impl Into<String>,
        options: SearchOptions,
        boolean: Boolean,
    ) -> &mut Self {
        let kind = WhereKind::Search {
            text: text.into(),
            fields: options.fields,
            match_type: options.match_type,
            fuzziness: options.fuzziness,
            constant_score: options.constant_score,
        };
        self.push_kind(kind, boolean)
    }

    fn where_starts_with(&mut self, column: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let kind = WhereKind::Prefix {
            column: column.into(),
            value: value.into(),
        };
        self.push_kind(kind, Boolean::And)
    }

    fn or_where_starts_with(
        &mut self,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        let kind = WhereKind::Prefix {
            column: column.into(),
            value: value.into(),
        };
        self.push_kind(kind, Boolean::Or)
    }

    fn function_score(
        &mut self,
        function_type: impl Into<String>,
        params: Map<String, Value>,
    ) -> &mut Self {
        let kind = WhereKind::FunctionScore {
            function_type: function_type.into(),
            params,
        };
        self.push_kind(kind, Boolean::And)
    }

    /// Clauses added inside `build` go to the filter context
    fn filter<F: FnOnce(&mut Self)>(&mut self, build: F) -> &mut Self {
        let start = self.state().wheres.len();
        build(self);
        let state = self.state_mut();
        state.filters.extend(state.wheres.drain(start..));
        self
    }

    /// Clauses added inside `build` go to the post-filter context
    fn post_filter<F: FnOnce(&mut Self)>(&mut self, build: F) -> &mut Self {
        let start = self.state().wheres.len();
        build(self);
        let state = self.state_mut();
        state.post_filters.extend(state.wheres.drain(start..));
        self
    }

    fn aggregation(&mut self, key: impl Into<String>, kind: AggregationKind) -> &mut Self {
        self.push_aggregation(AggregationNode::new(key, kind))
    }

    /// Aggregation whose sub-aggregations are added by `build`
    fn aggregation_with<F>(&mut self, key: impl Into<String>, kind: AggregationKind, build: F) -> &mut Self
    where
        F: FnOnce(&mut AggregationNode),
    {
        let mut node = AggregationNode::new(key, kind);
        build(&mut node);
        self.push_aggregation(node)
    }

    fn push_aggregation(&mut self, node: AggregationNode) -> &mut Self {
        self.state_mut().aggregations.push(node);
        self
    }
}

impl QueryClauses for QueryState {
    fn state(&self) -> &QueryState {
        self
    }

    fn state_mut(&mut self) -> &mut QueryState {
        self
    }
}

fn basic(column: impl Into<String>, operator: Operator, value: impl Into<FieldValue>) -> WhereKind {
    WhereKind::Basic {
        column: column.into(),
        operator,
        value: value.into(),
        negate: false,
    }
}

fn between(
    column: impl Into<String>,
    low: impl Into<FieldValue>,
    high: impl Into<FieldValue>,
    negate: bool,
) -> WhereKind {
    WhereKind::Between {
        column: column.into(),
        low: low.into(),
        high: high.into(),
        negate,
    }
}

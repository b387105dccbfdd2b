//! Clause model: where/filter clauses and sort specifications
//!
//! Every clause added through [`QueryClauses`](super::QueryClauses) ends up
//! as a [`WhereClause`] in one of the three contexts of a
//! [`QueryState`]. The model is plain data and serializes with serde so a
//! whole query can be stored or shipped as YAML/JSON and compiled later.

use super::state::QueryState;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// How a clause combines with the clauses before it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boolean {
    #[default]
    And,
    Or,
}

/// Comparison operator of basic and date clauses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "like")]
    Like,
    #[serde(rename = "exists")]
    Exists,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Like => "like",
            Operator::Exists => "exists",
        }
    }

    /// Key inside a `range` query, for the comparison operators only
    pub fn range_key(self) -> Option<&'static str> {
        match self {
            Operator::Gt => Some("gt"),
            Operator::Gte => Some("gte"),
            Operator::Lt => Some("lt"),
            Operator::Lte => Some("lte"),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "like" => Ok(Operator::Like),
            "exists" => Ok(Operator::Exists),
            _ => Err(Error::InvalidOperator(s.to_string())),
        }
    }
}

/// Key marking a timestamp in stored query descriptions: `{"$date": "..."}`
pub const DATE_TAG: &str = "$date";

/// A clause value: timestamps are kept apart so they can be rendered with
/// the configured date format at compile time.
///
/// Timestamps serialize as `{"$date": "<rfc3339>"}`. A bare string is always
/// a plain value, even when it looks like a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "FieldValueRepr", into = "FieldValueRepr")]
pub enum FieldValue {
    Date(DateTime<Utc>),
    Json(Value),
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaggedDate {
    #[serde(rename = "$date")]
    date: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FieldValueRepr {
    Date(TaggedDate),
    Json(Value),
}

impl From<FieldValueRepr> for FieldValue {
    fn from(repr: FieldValueRepr) -> Self {
        match repr {
            FieldValueRepr::Date(tagged) => FieldValue::Date(tagged.date),
            FieldValueRepr::Json(value) => FieldValue::Json(value),
        }
    }
}

impl From<FieldValue> for FieldValueRepr {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Date(date) => FieldValueRepr::Date(TaggedDate { date }),
            FieldValue::Json(value) => FieldValueRepr::Json(value),
        }
    }
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Json(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Json(Value::Null))
    }

    /// JSON form, with timestamps in their tagged `{"$date": ..}` shape
    pub fn into_json(self) -> Value {
        match self {
            FieldValue::Date(date) => {
                let mut tagged = Map::new();
                tagged.insert(
                    DATE_TAG.to_string(),
                    Value::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
                );
                Value::Object(tagged)
            }
            FieldValue::Json(value) => value,
        }
    }
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::null()
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Date(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Json(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Json(Value::String(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Json(Value::Bool(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Json(Value::from(value))
    }
}

macro_rules! field_value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    FieldValue::Json(Value::from(value))
                }
            }
        )*
    };
}

field_value_from_int!(i32, i64, u32, u64, usize);

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Per-clause options applied to the compiled shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClauseOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f64>,
    /// `true`, `{}` or a full inner_hits object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_hits: Option<Value>,
}

impl ClauseOptions {
    pub fn is_empty(&self) -> bool {
        self.boost.is_none() && self.inner_hits.is_none()
    }
}

/// Parent/child direction of a relationship clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Parent,
    Child,
}

/// Calendar component compared by a date-part clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePart {
    Year,
    Month,
    Day,
    Weekday,
}

impl DatePart {
    /// Property of the painless date object holding this component
    pub fn script_property(self) -> &'static str {
        match self {
            DatePart::Year => "year",
            DatePart::Month => "monthOfYear",
            DatePart::Day => "dayOfMonth",
            DatePart::Weekday => "dayOfWeek",
        }
    }
}

/// A field searched by a full-text clause, optionally boosted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f64>,
}

impl SearchField {
    pub fn boosted(name: impl Into<String>, boost: f64) -> Self {
        Self {
            name: name.into(),
            boost: Some(boost),
        }
    }
}

impl From<&str> for SearchField {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            boost: None,
        }
    }
}

impl From<String> for SearchField {
    fn from(name: String) -> Self {
        Self { name, boost: None }
    }
}

/// Optional knobs of a full-text clause
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub fields: Vec<SearchField>,
    pub match_type: Option<String>,
    pub fuzziness: Option<Value>,
    pub constant_score: bool,
}

/// The clause variants understood by the compiler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WhereKind {
    Basic {
        column: String,
        operator: Operator,
        #[serde(default)]
        value: FieldValue,
        #[serde(default)]
        negate: bool,
    },
    In {
        column: String,
        values: Vec<FieldValue>,
    },
    NotIn {
        column: String,
        values: Vec<FieldValue>,
    },
    Between {
        column: String,
        low: FieldValue,
        high: FieldValue,
        #[serde(default)]
        negate: bool,
    },
    Null {
        column: String,
    },
    NotNull {
        column: String,
    },
    Date {
        column: String,
        operator: Operator,
        value: FieldValue,
    },
    DatePart {
        column: String,
        part: DatePart,
        operator: Operator,
        value: i64,
    },
    GeoDistance {
        column: String,
        location: Value,
        distance: String,
    },
    GeoBoundsIn {
        column: String,
        bounds: Value,
    },
    NestedDoc {
        column: String,
        query: Box<QueryState>,
        #[serde(default)]
        negate: bool,
    },
    Group {
        query: Box<QueryState>,
    },
    Not {
        query: Box<QueryState>,
    },
    Relationship {
        relation: Relation,
        document_type: String,
        query: Box<QueryState>,
    },
    ParentId {
        parent_type: String,
        id: FieldValue,
    },
    Script {
        source: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    Search {
        text: String,
        #[serde(default)]
        fields: Vec<SearchField>,
        #[serde(default)]
        match_type: Option<String>,
        #[serde(default)]
        fuzziness: Option<Value>,
        #[serde(default)]
        constant_score: bool,
    },
    Prefix {
        column: String,
        value: String,
    },
    FunctionScore {
        function_type: String,
        #[serde(default)]
        params: Map<String, Value>,
    },
}

impl WhereKind {
    /// Column the clause targets, if it targets one
    pub fn column(&self) -> Option<&str> {
        match self {
            WhereKind::Basic { column, .. }
            | WhereKind::In { column, .. }
            | WhereKind::NotIn { column, .. }
            | WhereKind::Between { column, .. }
            | WhereKind::Null { column }
            | WhereKind::NotNull { column }
            | WhereKind::Date { column, .. }
            | WhereKind::DatePart { column, .. }
            | WhereKind::GeoDistance { column, .. }
            | WhereKind::GeoBoundsIn { column, .. }
            | WhereKind::NestedDoc { column, .. }
            | WhereKind::Prefix { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// One clause in a where, filter or post-filter list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhereClause {
    #[serde(flatten)]
    pub kind: WhereKind,
    #[serde(default)]
    pub boolean: Boolean,
    #[serde(default, skip_serializing_if = "ClauseOptions::is_empty")]
    pub options: ClauseOptions,
}

impl WhereClause {
    pub fn new(kind: WhereKind) -> Self {
        Self {
            kind,
            boolean: Boolean::And,
            options: ClauseOptions::default(),
        }
    }

    pub fn or(mut self) -> Self {
        self.boolean = Boolean::Or;
        self
    }

    pub fn with_boolean(mut self, boolean: Boolean) -> Self {
        self.boolean = boolean;
        self
    }

    pub fn boost(mut self, boost: f64) -> Self {
        self.options.boost = Some(boost);
        self
    }

    pub fn inner_hits(mut self, inner_hits: Value) -> Self {
        self.options.inner_hits = Some(inner_hits);
        self
    }

    pub fn with_options(mut self, options: ClauseOptions) -> Self {
        self.options = options;
        self
    }
}

impl From<WhereKind> for WhereClause {
    fn from(kind: WhereKind) -> Self {
        WhereClause::new(kind)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(Error::InvalidOption {
                option: "order direction",
                value: s.to_string(),
                allowed: vec!["asc", "desc"],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderKind {
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        missing: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    GeoDistance {
        coordinates: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        unit: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        distance_type: Option<String>,
    },
}

impl Default for OrderKind {
    fn default() -> Self {
        OrderKind::Basic {
            missing: None,
            mode: None,
        }
    }
}

/// A single sort entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub column: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub kind: OrderKind,
}

impl OrderSpec {
    pub fn new(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
            kind: OrderKind::default(),
        }
    }

    /// Sort by distance from `coordinates`; unit and distance type fall
    /// back to `km` and `plane` when compiled.
    pub fn geo_distance(column: impl Into<String>, coordinates: Value, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
            kind: OrderKind::GeoDistance {
                coordinates,
                unit: None,
                distance_type: None,
            },
        }
    }

    /// Value used for documents missing the field (`_first`, `_last` or a literal)
    pub fn missing(mut self, value: Value) -> Self {
        if let OrderKind::Basic { missing, .. } = &mut self.kind {
            *missing = Some(value);
        }
        self
    }

    /// Multi-valued field reduction: `min`, `max`, `sum`, `avg` or `median`
    pub fn mode(mut self, value: impl Into<String>) -> Self {
        if let OrderKind::Basic { mode, .. } = &mut self.kind {
            *mode = Some(value.into());
        }
        self
    }

    pub fn unit(mut self, value: impl Into<String>) -> Self {
        if let OrderKind::GeoDistance { unit, .. } = &mut self.kind {
            *unit = Some(value.into());
        }
        self
    }

    pub fn distance_type(mut self, value: impl Into<String>) -> Self {
        if let OrderKind::GeoDistance { distance_type, .. } = &mut self.kind {
            *distance_type = Some(value.into());
        }
        self
    }
}

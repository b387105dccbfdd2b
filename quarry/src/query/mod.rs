//! Query model and the fluent builder

mod aggregation;
mod builder;
mod clause;
mod state;

pub use aggregation::{AggregationKind, AggregationNode, Metric};
pub use builder::{Client, QueryBuilder, CURSOR_PAGE_SIZE, SCROLL_KEEP_ALIVE};
pub use clause::{
    Boolean, ClauseOptions, DatePart, Direction, FieldValue, Operator, OrderKind, OrderSpec,
    Relation, SearchField, SearchOptions, WhereClause, WhereKind,
};
pub use state::{Conflicts, QueryClauses, QueryOptions, QueryState, Refresh};

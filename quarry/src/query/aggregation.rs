//! Aggregation tree model

use super::clause::FieldValue;
use super::state::QueryState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Single-value metric aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Sum,
    Avg,
    Max,
    Min,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Sum => "sum",
            Metric::Avg => "avg",
            Metric::Max => "max",
            Metric::Min => "min",
        }
    }
}

/// Aggregation type plus its arguments.
///
/// Argument maps are filtered against a per-type allow-list at compile
/// time, so unknown keys never reach the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregationKind {
    Terms {
        field: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    DateHistogram {
        field: String,
        #[serde(default)]
        options: Map<String, Value>,
    },
    Cardinality {
        #[serde(default)]
        args: Map<String, Value>,
    },
    Composite {
        #[serde(default)]
        args: Map<String, Value>,
    },
    DateRange {
        #[serde(default)]
        args: Map<String, Value>,
    },
    Exists {
        field: String,
    },
    Missing {
        field: String,
    },
    ReverseNested,
    Nested {
        path: String,
    },
    Children {
        document_type: String,
    },
    Filter {
        #[serde(default)]
        query: Box<QueryState>,
    },
    Metric {
        metric: Metric,
        #[serde(default)]
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script: Option<Value>,
    },
}

impl AggregationKind {
    pub fn terms(field: impl Into<String>) -> Self {
        AggregationKind::Terms {
            field: field.into(),
            options: Map::new(),
        }
    }

    pub fn date_histogram(field: impl Into<String>, calendar_interval: impl Into<String>) -> Self {
        let mut options = Map::new();
        options.insert(
            "calendar_interval".to_string(),
            Value::String(calendar_interval.into()),
        );
        AggregationKind::DateHistogram {
            field: field.into(),
            options,
        }
    }

    /// Histogram bounds; dates are rendered with the compiler's date format
    pub fn extended_bounds(self, min: impl Into<FieldValue>, max: impl Into<FieldValue>) -> Self {
        let bounds = Value::Array(vec![min.into().into_json(), max.into().into_json()]);
        self.with_arg("extended_bounds", bounds)
    }

    pub fn cardinality(field: impl Into<String>) -> Self {
        let mut args = Map::new();
        args.insert("field".to_string(), Value::String(field.into()));
        AggregationKind::Cardinality { args }
    }

    pub fn metric(metric: Metric, field: impl Into<String>) -> Self {
        AggregationKind::Metric {
            metric,
            field: field.into(),
            script: None,
        }
    }

    /// Metric over a script instead of a field
    pub fn metric_script(metric: Metric, script: Value) -> Self {
        AggregationKind::Metric {
            metric,
            field: String::new(),
            script: Some(script),
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::metric(Metric::Sum, field)
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::metric(Metric::Avg, field)
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::metric(Metric::Max, field)
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::metric(Metric::Min, field)
    }

    pub fn nested(path: impl Into<String>) -> Self {
        AggregationKind::Nested { path: path.into() }
    }

    pub fn children(document_type: impl Into<String>) -> Self {
        AggregationKind::Children {
            document_type: document_type.into(),
        }
    }

    /// Adds an argument to the kinds that carry an argument map
    pub fn with_arg(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            AggregationKind::Terms { options, .. }
            | AggregationKind::DateHistogram { options, .. } => {
                options.insert(key.into(), value);
            }
            AggregationKind::Cardinality { args }
            | AggregationKind::Composite { args }
            | AggregationKind::DateRange { args } => {
                args.insert(key.into(), value);
            }
            _ => {}
        }
        self
    }
}

/// A named aggregation with optional sub-aggregations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationNode {
    pub key: String,
    #[serde(flatten)]
    pub kind: AggregationKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AggregationNode>,
}

impl AggregationNode {
    pub fn new(key: impl Into<String>, kind: AggregationKind) -> Self {
        Self {
            key: key.into(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: AggregationNode) -> Self {
        self.children.push(child);
        self
    }

    /// Append a sub-aggregation
    pub fn aggregation(&mut self, key: impl Into<String>, kind: AggregationKind) -> &mut Self {
        self.children.push(AggregationNode::new(key, kind));
        self
    }

    /// Append a sub-aggregation whose own children are added by `build`
    pub fn aggregation_with<F>(&mut self, key: impl Into<String>, kind: AggregationKind, build: F) -> &mut Self
    where
        F: FnOnce(&mut AggregationNode),
    {
        let mut child = AggregationNode::new(key, kind);
        build(&mut child);
        self.children.push(child);
        self
    }
}

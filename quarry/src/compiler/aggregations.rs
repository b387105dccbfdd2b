//! Aggregation tree compilation

use super::{attach_filter, strip_collection, Compiler};
use crate::error::Result;
use crate::query::{AggregationKind, AggregationNode, FieldValue};
use serde_json::{json, Map, Value};

const TERMS_ARGS: &[&str] = &[
    "collect_mode",
    "exclude",
    "execution_hint",
    "include",
    "min_doc_count",
    "missing",
    "order",
    "script",
    "show_term_doc_count_error",
    "size",
];

const DATE_HISTOGRAM_ARGS: &[&str] = &[
    "interval",
    "calendar_interval",
    "fixed_interval",
    "min_doc_count",
    "extended_bounds",
    "format",
    "time_zone",
];

const CARDINALITY_ARGS: &[&str] = &["field", "precision_threshold", "missing", "script"];

const COMPOSITE_ARGS: &[&str] = &["sources", "size", "after"];

const DATE_RANGE_ARGS: &[&str] = &["field", "format", "ranges", "time_zone", "missing", "keyed"];

impl Compiler {
    /// Compile a list of aggregation nodes into the `aggregations` object
    pub fn compile_aggregations(
        &self,
        collection: &str,
        nodes: &[AggregationNode],
    ) -> Result<Map<String, Value>> {
        let mut compiled = Map::new();
        for node in nodes {
            compiled.insert(node.key.clone(), self.compile_aggregation(collection, node)?);
        }
        Ok(compiled)
    }

    fn compile_aggregation(&self, collection: &str, node: &AggregationNode) -> Result<Value> {
        let mut compiled = match &node.kind {
            AggregationKind::Terms { field, options } => {
                let mut terms = allowed(options, TERMS_ARGS);
                terms.insert("field".to_string(), json!(strip_collection(collection, field)));
                json!({ "terms": terms })
            }

            AggregationKind::DateHistogram { field, options } => {
                let mut histogram = allowed(options, DATE_HISTOGRAM_ARGS);
                histogram.insert("field".to_string(), json!(strip_collection(collection, field)));
                let bounds = match histogram.get("extended_bounds") {
                    Some(Value::Array(bounds)) => Some(json!({
                        "min": self.render_bound(bounds.first()),
                        "max": self.render_bound(bounds.get(1)),
                    })),
                    Some(Value::Object(bounds)) => Some(json!({
                        "min": self.render_bound(bounds.get("min")),
                        "max": self.render_bound(bounds.get("max")),
                    })),
                    _ => None,
                };
                if let Some(bounds) = bounds {
                    histogram.insert("extended_bounds".to_string(), bounds);
                }
                json!({ "date_histogram": histogram })
            }

            AggregationKind::Cardinality { args } => {
                json!({ "cardinality": allowed(args, CARDINALITY_ARGS) })
            }

            AggregationKind::Composite { args } => {
                json!({ "composite": allowed(args, COMPOSITE_ARGS) })
            }

            AggregationKind::DateRange { args } => {
                json!({ "date_range": allowed(args, DATE_RANGE_ARGS) })
            }

            AggregationKind::Exists { field } => {
                json!({"exists": {"field": strip_collection(collection, field)}})
            }

            AggregationKind::Missing { field } => {
                json!({"missing": {"field": strip_collection(collection, field)}})
            }

            AggregationKind::ReverseNested => json!({"reverse_nested": {}}),

            AggregationKind::Nested { path } => json!({"nested": {"path": path}}),

            AggregationKind::Children { document_type } => {
                json!({"children": {"type": document_type}})
            }

            AggregationKind::Filter { query } => {
                let contexts = self.compile_contexts(collection, query)?;
                let filter = match (contexts.query, contexts.filter) {
                    (query, Some(filter)) => attach_filter(query, filter),
                    (Some(query), None) => query,
                    (None, None) => json!({"match_all": {}}),
                };
                json!({ "filter": filter })
            }

            AggregationKind::Metric {
                metric,
                field,
                script,
            } => {
                let body = match script {
                    Some(script) => json!({ "script": script }),
                    None => json!({ "field": strip_collection(collection, field) }),
                };
                json!({ metric.as_str(): body })
            }
        };

        if !node.children.is_empty() {
            let children = self.compile_aggregations(collection, &node.children)?;
            if let Value::Object(map) = &mut compiled {
                map.insert("aggregations".to_string(), Value::Object(children));
            }
        }

        Ok(compiled)
    }
}

impl Compiler {
    fn render_bound(&self, bound: Option<&Value>) -> Value {
        match bound {
            Some(value) => serde_json::from_value::<FieldValue>(value.clone())
                .map(|value| self.render_value(&value))
                .unwrap_or_else(|_| value.clone()),
            None => Value::Null,
        }
    }
}

fn allowed(args: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    args.iter()
        .filter(|(key, _)| keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

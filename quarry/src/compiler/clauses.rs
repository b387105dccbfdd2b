//! Where-clause compilation and AND/OR grouping

use super::{attach_filter, strip_collection, Compiler};
use crate::dsl::deep_union;
use crate::error::{Error, Result};
use crate::query::{
    Boolean, ClauseOptions, FieldValue, Operator, QueryState, Relation, SearchField, WhereClause,
    WhereKind,
};
use serde_json::{json, Map, Value};

/// The three compiled contexts of a query state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledContexts {
    pub query: Option<Value>,
    pub filter: Option<Value>,
    pub post_filter: Option<Value>,
}

/// A compiled clause shape and whether it still needs a `must_not` wrapper
struct Compiled {
    shape: Value,
    negated: bool,
}

impl Compiled {
    fn plain(shape: Value) -> Self {
        Self {
            shape,
            negated: false,
        }
    }

    fn negated_if(shape: Value, negated: bool) -> Self {
        Self { shape, negated }
    }
}

impl Compiler {
    pub fn compile_contexts(&self, collection: &str, state: &QueryState) -> Result<CompiledContexts> {
        Ok(CompiledContexts {
            query: self.compile_clauses(collection, &state.wheres)?,
            filter: self.compile_clauses(collection, &state.filters)?,
            post_filter: self.compile_clauses(collection, &state.post_filters)?,
        })
    }

    /// Compile an ordered clause list.
    ///
    /// AND clauses accumulate into one tree via [`deep_union`]. The first OR
    /// clause turns the tree built so far into the first element of a
    /// `should` array; every later clause is appended to it. When the list
    /// has more than one clause, each AND clause is wrapped in
    /// `{"bool": {"must": [...]}}` before it is merged.
    pub fn compile_clauses(&self, collection: &str, clauses: &[WhereClause]) -> Result<Option<Value>> {
        let wrap_and = clauses.len() > 1;
        let mut query: Option<Value> = None;
        let mut should: Option<Vec<Value>> = None;

        for clause in clauses {
            let mut compiled = self.compile_clause(collection, clause)?;
            if wrap_and && clause.boolean == Boolean::And {
                compiled = json!({"bool": {"must": [compiled]}});
            }

            if should.is_none() && clause.boolean == Boolean::Or {
                should = Some(query.take().into_iter().collect());
            }

            match should.as_mut() {
                Some(should) => should.push(compiled),
                None => match query.as_mut() {
                    Some(existing) => deep_union(existing, compiled),
                    None => query = Some(compiled),
                },
            }
        }

        Ok(match should {
            Some(should) => Some(json!({"bool": {"should": should}})),
            None => query,
        })
    }

    /// Compile one clause: core shape, then options, then negation
    pub fn compile_clause(&self, collection: &str, clause: &WhereClause) -> Result<Value> {
        let Compiled { shape, negated } = self.compile_kind(collection, &clause.kind)?;
        let shape = apply_options(shape, &clause.options);
        Ok(if negated {
            json!({"bool": {"must_not": [shape]}})
        } else {
            shape
        })
    }

    fn compile_kind(&self, collection: &str, kind: &WhereKind) -> Result<Compiled> {
        let compiled = match kind {
            WhereKind::Basic {
                column,
                operator,
                value,
                negate,
            } => self.compile_basic(strip_collection(collection, column), *operator, value, *negate),

            WhereKind::In { column, values } => Compiled::plain(self.terms(collection, column, values)),

            WhereKind::NotIn { column, values } => {
                Compiled::negated_if(self.terms(collection, column, values), true)
            }

            WhereKind::Between {
                column,
                low,
                high,
                negate,
            } => Compiled::plain(self.compile_between(
                strip_collection(collection, column),
                low,
                high,
                *negate,
            )),

            WhereKind::Null { column } => self.compile_basic(
                strip_collection(collection, column),
                Operator::Eq,
                &FieldValue::null(),
                false,
            ),

            WhereKind::NotNull { column } => self.compile_basic(
                strip_collection(collection, column),
                Operator::Ne,
                &FieldValue::null(),
                false,
            ),

            WhereKind::Date {
                column,
                operator,
                value,
            } => {
                let column = strip_collection(collection, column);
                if *operator == Operator::Eq {
                    Compiled::plain(self.compile_between(column, value, value, false))
                } else {
                    self.compile_basic(column, *operator, value, false)
                }
            }

            WhereKind::DatePart {
                column,
                part,
                operator,
                value,
            } => {
                let comparison = match operator {
                    Operator::Eq => "==",
                    Operator::Like | Operator::Exists => {
                        return Err(Error::InvalidOperator(operator.to_string()))
                    }
                    other => other.as_str(),
                };
                let column = strip_collection(collection, column);
                let source = format!(
                    "doc.{column}.size() > 0 && doc.{column}.date.{} {comparison} params.value",
                    part.script_property()
                );
                let mut options = Map::new();
                options.insert("params".to_string(), json!({ "value": value }));
                Compiled::plain(script(&source, &options))
            }

            WhereKind::GeoDistance {
                column,
                location,
                distance,
            } => Compiled::plain(json!({
                "geo_distance": {
                    "distance": distance,
                    strip_collection(collection, column): location,
                }
            })),

            WhereKind::GeoBoundsIn { column, bounds } => Compiled::plain(json!({
                "geo_bounding_box": { strip_collection(collection, column): bounds }
            })),

            WhereKind::NestedDoc {
                column,
                query,
                negate,
            } => {
                let inner = self.single_context(collection, query, "nested")?;
                Compiled::negated_if(
                    json!({"nested": {"path": strip_collection(collection, column), "query": inner}}),
                    *negate,
                )
            }

            WhereKind::Group { query } => {
                let contexts = self.compile_contexts(collection, query)?;
                let shape = match (contexts.query, contexts.filter) {
                    (query, Some(filter)) => attach_filter(query, filter),
                    (Some(query), None) => query,
                    (None, None) => match_all(),
                };
                Compiled::plain(shape)
            }

            WhereKind::Not { query } => {
                let inner = self.single_context(collection, query, "not")?;
                Compiled::plain(json!({"bool": {"must_not": [inner]}}))
            }

            WhereKind::Relationship {
                relation,
                document_type,
                query,
            } => {
                let inner = self.single_context(collection, query, relation_name(*relation))?;
                let shape = match relation {
                    Relation::Parent => json!({
                        "has_parent": {"parent_type": document_type, "query": inner}
                    }),
                    Relation::Child => json!({
                        "has_child": {"type": document_type, "query": inner}
                    }),
                };
                Compiled::plain(shape)
            }

            WhereKind::ParentId { parent_type, id } => Compiled::plain(json!({
                "parent_id": {"type": parent_type, "id": self.render_value(id)}
            })),

            WhereKind::Script { source, options } => Compiled::plain(script(source, options)),

            WhereKind::Search {
                text,
                fields,
                match_type,
                fuzziness,
                constant_score,
            } => Compiled::plain(compile_search(
                collection,
                text,
                fields,
                match_type.as_deref(),
                fuzziness.as_ref(),
                *constant_score,
            )),

            WhereKind::Prefix { column, value } => Compiled::plain(json!({
                "prefix": { strip_collection(collection, column): value }
            })),

            WhereKind::FunctionScore {
                function_type,
                params,
            } => Compiled::plain(json!({
                "function_score": { function_type: params }
            })),
        };
        Ok(compiled)
    }

    fn compile_basic(
        &self,
        column: &str,
        operator: Operator,
        value: &FieldValue,
        negate: bool,
    ) -> Compiled {
        let value = self.render_value(value);

        let shape = if value.is_null() || operator == Operator::Exists {
            json!({"exists": {"field": column}})
        } else if operator == Operator::Like {
            let pattern = match &value {
                Value::String(s) => s.replace('%', "*"),
                other => other.to_string(),
            };
            json!({"wildcard": { column: pattern }})
        } else if let Some(bound) = operator.range_key() {
            json!({"range": { column: { bound: value } }})
        } else {
            json!({"term": { column: value }})
        };

        let negated = negate
            || (operator == Operator::Ne && !value.is_null())
            || (operator == Operator::Eq && value.is_null())
            || (operator == Operator::Exists && !is_truthy(&value));

        Compiled::negated_if(shape, negated)
    }

    fn compile_between(&self, column: &str, low: &FieldValue, high: &FieldValue, negate: bool) -> Value {
        let low = self.render_value(low);
        let high = self.render_value(high);
        if negate {
            json!({"bool": {"should": [
                {"range": { column: {"lte": low} }},
                {"range": { column: {"gte": high} }},
            ]}})
        } else {
            json!({"range": { column: {"gte": low, "lte": high} }})
        }
    }

    fn terms(&self, collection: &str, column: &str, values: &[FieldValue]) -> Value {
        let values: Vec<Value> = values.iter().map(|v| self.render_value(v)).collect();
        json!({"terms": { strip_collection(collection, column): values }})
    }

    /// Compile a sub-query that must live in exactly one context.
    ///
    /// The query context wins, the filter context is the fallback, and an
    /// empty sub-query matches everything.
    fn single_context(&self, collection: &str, state: &QueryState, context: &str) -> Result<Value> {
        let contexts = self.compile_contexts(collection, state)?;
        match (contexts.query, contexts.filter) {
            (Some(_), Some(_)) => Err(Error::ConflictingQueryContext {
                context: context.to_string(),
            }),
            (Some(query), None) => Ok(query),
            (None, Some(filter)) => Ok(filter),
            (None, None) => Ok(match_all()),
        }
    }
}

fn relation_name(relation: Relation) -> &'static str {
    match relation {
        Relation::Parent => "has_parent",
        Relation::Child => "has_child",
    }
}

fn match_all() -> Value {
    json!({"match_all": {}})
}

fn script(source: &str, options: &Map<String, Value>) -> Value {
    let mut script = options.clone();
    script.insert("source".to_string(), Value::String(source.to_string()));
    json!({"script": {"script": script}})
}

fn compile_search(
    collection: &str,
    text: &str,
    fields: &[SearchField],
    match_type: Option<&str>,
    fuzziness: Option<&Value>,
    constant_score: bool,
) -> Value {
    let fields: Vec<String> = if fields.is_empty() {
        vec!["_all".to_string()]
    } else {
        fields
            .iter()
            .map(|field| {
                let name = strip_collection(collection, &field.name);
                match field.boost {
                    Some(boost) => format!("{name}^{boost}"),
                    None => name.to_string(),
                }
            })
            .collect()
    };

    let mut query = if fields.len() > 1 {
        let mut multi_match = json!({
            "query": text,
            "type": match_type.unwrap_or("most_fields"),
            "fields": fields,
        });
        if let Some(fuzziness) = fuzziness {
            multi_match["fuzziness"] = fuzziness.clone();
        }
        json!({ "multi_match": multi_match })
    } else {
        let mut field_query = json!({ "query": text });
        if let Some(fuzziness) = fuzziness {
            field_query["fuzziness"] = fuzziness.clone();
        }
        json!({"match": { fields[0].as_str(): field_query }})
    };

    if constant_score {
        query = json!({"constant_score": {"query": query}});
    }
    query
}

/// Apply per-clause options to the outermost key of a compiled shape
fn apply_options(mut shape: Value, options: &ClauseOptions) -> Value {
    if options.is_empty() {
        return shape;
    }
    let Some(map) = shape.as_object_mut() else {
        return shape;
    };
    let Some(key) = map.keys().next().cloned() else {
        return shape;
    };
    let Some(Value::Object(inner)) = map.get_mut(&key) else {
        return shape;
    };

    if let Some(boost) = options.boost {
        if key == "term" {
            // {term: {col: v}} becomes {term: {col: {value: v, boost}}}
            for value in inner.values_mut() {
                if !value.is_object() {
                    let plain = value.take();
                    *value = json!({"value": plain});
                }
                if let Value::Object(field) = value {
                    field.insert("boost".to_string(), json!(boost));
                }
            }
        } else {
            inner.insert("boost".to_string(), json!(boost));
        }
    }

    if let Some(inner_hits) = &options.inner_hits {
        let inner_hits = match inner_hits {
            Value::Object(map) => Value::Object(map.clone()),
            _ => json!({}),
        };
        inner.insert("inner_hits".to_string(), inner_hits);
    }

    shape
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(_) => true,
    }
}

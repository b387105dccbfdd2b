//! Index, bulk and update request compilation

use super::Compiler;
use crate::dsl::{BulkOperation, BulkRequest, Document, IndexRequest, WriteRequest};
use crate::query::QueryState;
use serde_json::{json, Map, Value};
use uuid::Uuid;

const CHILD_DOCUMENTS_KEY: &str = "child_documents";

/// A document split into its metadata and its stored body
struct PreparedDocument {
    id: String,
    routing: Option<String>,
    parent: Option<String>,
    children: Vec<BulkOperation>,
    body: Document,
}

impl Compiler {
    /// Compile a single-document insert.
    ///
    /// A document carrying `child_documents` becomes a bulk request with the
    /// children first, so they are indexed alongside their parent.
    pub fn compile_index(&self, state: &QueryState, document: Document) -> WriteRequest {
        let index = self.index_name(&state.collection);
        let prepared = prepare(&index, state, document);

        if prepared.children.is_empty() {
            WriteRequest::Index(IndexRequest {
                index,
                id: prepared.id,
                body: prepared.body,
                routing: prepared.routing,
                parent: prepared.parent,
                partial: false,
            })
        } else {
            let mut operations = prepared.children;
            operations.push(BulkOperation {
                action: index_action(&index, &prepared.id, prepared.routing.as_deref(), prepared.parent.as_deref()),
                source: prepared.body,
            });
            WriteRequest::Bulk(BulkRequest { operations })
        }
    }

    /// Compile a batch insert as one bulk request
    pub fn compile_bulk(&self, state: &QueryState, documents: Vec<Document>) -> BulkRequest {
        let index = self.index_name(&state.collection);
        let mut operations = Vec::with_capacity(documents.len());

        for document in documents {
            let prepared = prepare(&index, state, document);
            operations.extend(prepared.children);
            operations.push(BulkOperation {
                action: index_action(&index, &prepared.id, prepared.routing.as_deref(), prepared.parent.as_deref()),
                source: prepared.body,
            });
        }

        BulkRequest { operations }
    }

    /// Compile a partial update of one document, upserting when absent
    pub fn compile_update(&self, state: &QueryState, values: Document) -> IndexRequest {
        let index = self.index_name(&state.collection);
        let prepared = prepare(&index, state, values);
        IndexRequest {
            index,
            id: prepared.id,
            body: prepared.body,
            routing: prepared.routing,
            parent: prepared.parent,
            partial: true,
        }
    }
}

fn prepare(index: &str, state: &QueryState, mut document: Document) -> PreparedDocument {
    let id = take_id(&mut document).unwrap_or_else(generate_id);

    let children = match document.remove(CHILD_DOCUMENTS_KEY) {
        Some(Value::Array(children)) => children
            .into_iter()
            .map(|child| child_operation(index, &id, child))
            .collect(),
        _ => Vec::new(),
    };

    let routing = document
        .remove("_routing")
        .map(|v| plain_string(&v))
        .or_else(|| state.options.routing.clone());
    let parent = document
        .remove("_parent")
        .map(|v| plain_string(&v))
        .or_else(|| state.options.parent_id.clone());

    PreparedDocument {
        id,
        routing,
        parent,
        children,
        body: document,
    }
}

/// Removes both id fields; `_id` wins over `id`
fn take_id(document: &mut Document) -> Option<String> {
    let underscore = document.remove("_id").filter(|v| !v.is_null());
    let plain = document.remove("id").filter(|v| !v.is_null());
    underscore.or(plain).map(|v| plain_string(&v))
}

fn child_operation(index: &str, parent_id: &str, child: Value) -> BulkOperation {
    let mut child = match child {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("document".to_string(), other);
            map
        }
    };

    let id = take_id(&mut child).unwrap_or_else(generate_id);
    let source = match child.remove("document") {
        Some(Value::Object(document)) => document,
        _ => child,
    };

    BulkOperation {
        action: json!({"index": {"_index": index, "_id": id, "parent": parent_id}}),
        source,
    }
}

fn index_action(index: &str, id: &str, routing: Option<&str>, parent: Option<&str>) -> Value {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(index));
    meta.insert("_id".to_string(), json!(id));
    if let Some(routing) = routing {
        meta.insert("routing".to_string(), json!(routing));
    }
    if let Some(parent) = parent {
        meta.insert("parent".to_string(), json!(parent));
    }
    json!({ "index": meta })
}

fn generate_id() -> String {
    Uuid::now_v7().to_string()
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

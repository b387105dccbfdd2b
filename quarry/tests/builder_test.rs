//! QueryBuilder behaviour against a recording connection

mod common;

use common::{client, doc, hits_response, Recorded, RecordingConnection};
use futures::StreamExt;
use quarry::dsl::SourceFilter;
use quarry::query::{Conflicts, Refresh};
use quarry::{Direction, Error, QueryClauses};
use serde_json::{json, Value};

#[tokio::test]
async fn test_get_maps_hits_to_documents() {
    let conn = RecordingConnection::new();
    conn.respond(hits_response(1, &[("1", json!({"a": 1}))]));

    let mut query = client(conn.clone()).query("posts");
    query.where_eq("status", "published").limit(10);
    let docs = query.get().await.unwrap();

    assert_eq!(docs.len(), 1);
    assert_eq!(Value::Object(docs[0].clone()), json!({"a": 1, "id": "1"}));

    let searches = conn.searches();
    assert_eq!(searches.len(), 1);
    assert_eq!(searches[0].index, "posts");
    assert_eq!(searches[0].body.size, Some(10));
    assert_eq!(
        searches[0].body.query,
        Some(json!({"term": {"status": "published"}}))
    );
}

#[tokio::test]
async fn test_results_cached_until_offset_changes() {
    let conn = RecordingConnection::new();
    conn.respond(json!({
        "took": 12,
        "hits": {"total": {"value": 40}, "hits": []},
        "aggregations": {"tags": {"buckets": []}}
    }));

    let mut query = client(conn.clone()).query("posts");
    query.get().await.unwrap();
    assert_eq!(
        query.aggregation_results().await.unwrap(),
        json!({"tags": {"buckets": []}})
    );
    assert_eq!(query.count_for_pagination().await.unwrap(), 40);
    assert_eq!(query.search_duration().await.unwrap(), Some(12));
    assert_eq!(conn.searches().len(), 1);

    query.offset(20);
    query.get().await.unwrap();
    assert_eq!(conn.searches().len(), 2);
    assert_eq!(conn.searches()[1].body.from, Some(20));
}

#[tokio::test]
async fn test_get_columns_restores_projection() {
    let conn = RecordingConnection::new();
    let mut query = client(conn.clone()).query("posts");

    query.get_columns(&["title", "author"]).await.unwrap();
    assert!(query.state().columns.is_none());
    assert_eq!(
        conn.searches()[0].body.source,
        SourceFilter::Fields(vec!["title".to_string(), "author".to_string()])
    );

    let conn = RecordingConnection::new();
    let mut query = client(conn.clone()).query("posts");
    query.select(["summary"]);
    query.get_columns(&["title"]).await.unwrap();
    assert_eq!(
        conn.searches()[0].body.source,
        SourceFilter::Fields(vec!["summary".to_string()])
    );
    assert_eq!(query.state().columns, Some(vec!["summary".to_string()]));
}

#[tokio::test]
async fn test_first_limits_to_one_without_mutating() {
    let conn = RecordingConnection::new();
    conn.respond(hits_response(3, &[("7", json!({"title": "x"}))]));

    let mut query = client(conn.clone()).query("posts");
    query.order_by("created", Direction::Desc);
    let first = query.first().await.unwrap().unwrap();

    assert_eq!(first["id"], json!("7"));
    assert_eq!(conn.searches()[0].body.size, Some(1));
    assert_eq!(
        conn.searches()[0].body.sort,
        Some(vec![json!({"created": {"order": "desc"}})])
    );
    assert!(query.state().limit.is_none());
}

#[tokio::test]
async fn test_count_without_cache_runs_minimal_search() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"hits": {"total": 5, "hits": []}}));

    let mut query = client(conn.clone()).query("posts");
    query.where_eq("status", "published").limit(50).offset(100);
    assert_eq!(query.count_for_pagination().await.unwrap(), 5);

    let search = &conn.searches()[0];
    assert_eq!(search.body.size, Some(1));
    assert_eq!(search.body.from, None);
    assert_eq!(search.body.query, Some(json!({"term": {"status": "published"}})));
}

#[tokio::test]
async fn test_count_without_total_is_malformed() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"hits": {"hits": []}}));

    let mut query = client(conn).query("posts");
    let err = query.count_for_pagination().await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
}

#[tokio::test]
async fn test_cursor_follows_scroll_ids() {
    let conn = RecordingConnection::new();
    conn.respond(json!({
        "_scroll_id": "s1",
        "hits": {"total": 3, "hits": [
            {"_id": "1", "_source": {}},
            {"_id": "2", "_source": {}}
        ]}
    }));
    conn.respond(json!({
        "_scroll_id": "s2",
        "hits": {"total": 3, "hits": [{"_id": "3", "_source": {}}]}
    }));
    conn.respond(json!({"_scroll_id": "s3", "hits": {"total": 3, "hits": []}}));

    let query = client(conn.clone()).query("posts");
    let ids: Vec<Value> = query
        .cursor()
        .map(|doc| doc.unwrap()["id"].clone())
        .collect()
        .await;
    assert_eq!(ids, vec![json!("1"), json!("2"), json!("3")]);

    let requests = conn.requests();
    assert_eq!(requests.len(), 4);
    match &requests[0] {
        Recorded::Search(search) => {
            assert_eq!(search.scroll.as_deref(), Some("1m"));
            assert_eq!(search.body.size, Some(100));
        }
        other => panic!("Expected search, got {other:?}"),
    }
    assert!(matches!(&requests[1], Recorded::Scroll(id) if id == "s1"));
    assert!(matches!(&requests[2], Recorded::Scroll(id) if id == "s2"));
    assert!(matches!(&requests[3], Recorded::ClearScroll(id) if id == "s3"));
}

#[tokio::test]
async fn test_cursor_stops_at_limit() {
    let conn = RecordingConnection::new();
    conn.respond(json!({
        "_scroll_id": "s1",
        "hits": {"total": 3, "hits": [
            {"_id": "1", "_source": {}},
            {"_id": "2", "_source": {}},
            {"_id": "3", "_source": {}}
        ]}
    }));

    let mut query = client(conn.clone()).query("posts");
    query.limit(2);
    let count = query.cursor().count().await;
    assert_eq!(count, 2);

    let requests = conn.requests();
    assert_eq!(requests.len(), 2);
    assert!(matches!(&requests[1], Recorded::ClearScroll(id) if id == "s1"));
}

#[tokio::test]
async fn test_cursor_limit_on_page_boundary_skips_next_page() {
    let conn = RecordingConnection::new();
    conn.respond(json!({
        "_scroll_id": "s1",
        "hits": {"total": 4, "hits": [
            {"_id": "1", "_source": {}},
            {"_id": "2", "_source": {}}
        ]}
    }));

    let mut query = client(conn.clone()).query("posts");
    query.limit(2);
    assert_eq!(query.cursor().count().await, 2);

    let requests = conn.requests();
    assert_eq!(requests.len(), 2);
    assert!(matches!(&requests[1], Recorded::ClearScroll(id) if id == "s1"));
}

#[tokio::test]
async fn test_document_by_id() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"_id": "9", "found": true, "_source": {"a": 2}}));
    conn.respond_missing();

    let query = client(conn.clone()).query("posts");
    let found = query.document("9").await.unwrap().unwrap();
    assert_eq!(Value::Object(found), json!({"a": 2, "id": "9"}));
    assert!(query.document("10").await.unwrap().is_none());

    assert!(matches!(
        &conn.requests()[0],
        Recorded::Get(get) if get.index == "posts" && get.id == "9"
    ));
}

#[tokio::test]
async fn test_delete_carries_options() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"deleted": 3}));

    let mut query = client(conn.clone()).query("posts");
    query.where_eq("status", "spam").limit(5);
    query.on_conflicts("proceed").unwrap();
    query.with_refresh("true").unwrap();
    assert!(query.delete().await.unwrap());

    match &conn.requests()[0] {
        Recorded::DeleteByQuery(delete) => {
            assert_eq!(delete.conflicts, Some(Conflicts::Proceed));
            assert_eq!(delete.refresh, Some(Refresh::True));
            assert_eq!(delete.max_docs, Some(5));
            assert_eq!(delete.body.query, Some(json!({"term": {"status": "spam"}})));
        }
        other => panic!("Expected delete by query, got {other:?}"),
    }
}

#[tokio::test]
async fn test_invalid_conflict_option_rejected() {
    let conn = RecordingConnection::new();
    let mut query = client(conn.clone()).query("posts");

    let err = query.on_conflicts("retry").err().unwrap();
    assert!(matches!(err, Error::InvalidOption { option: "conflict", .. }));
    let err = query.with_refresh("wait_for").err().unwrap();
    assert!(matches!(err, Error::InvalidOption { option: "refresh", .. }));
    assert!(conn.requests().is_empty());
}

#[tokio::test]
async fn test_delete_by_id_targets_id_term() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"deleted": 0}));

    let query = client(conn.clone()).query("posts");
    assert!(!query.delete_by_id("42").await.unwrap());

    match &conn.requests()[0] {
        Recorded::DeleteByQuery(delete) => {
            assert_eq!(delete.body.query, Some(json!({"term": {"_id": "42"}})));
        }
        other => panic!("Expected delete by query, got {other:?}"),
    }
    assert!(query.state().wheres.is_empty());
}

#[tokio::test]
async fn test_insert_with_children_uses_bulk() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"errors": false, "items": []}));

    let query = client(conn.clone()).query("questions");
    query
        .insert(doc(json!({
            "id": "q1",
            "title": "How?",
            "child_documents": [{"id": "a1", "document": {"body": "Like this"}}]
        })))
        .await
        .unwrap();

    match &conn.requests()[0] {
        Recorded::Bulk(bulk) => {
            assert_eq!(bulk.len(), 2);
            assert_eq!(bulk.operations[0].action["index"]["parent"], json!("q1"));
        }
        other => panic!("Expected bulk, got {other:?}"),
    }
}

#[tokio::test]
async fn test_insert_many_surfaces_item_failures() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"errors": true, "items": [
        {"index": {"_id": "1", "status": 201}},
        {"index": {"_id": "2", "status": 400, "error": {
            "reason": "failed to parse",
            "caused_by": {"reason": "not a date"}
        }}}
    ]}));

    let query = client(conn.clone()).query("posts");
    let err = query
        .insert_many(vec![doc(json!({"id": 1})), doc(json!({"id": 2}))])
        .await
        .unwrap_err();

    match err {
        Error::BulkWriteFailed { total, failures } => {
            assert_eq!(total, 1);
            assert_eq!(failures[0].to_string(), "2: failed to parse: not a date");
        }
        other => panic!("Expected BulkWriteFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_insert_many_empty_sends_nothing() {
    let conn = RecordingConnection::new();
    let query = client(conn.clone()).query("posts");
    query.insert_many(Vec::new()).await.unwrap();
    assert!(conn.requests().is_empty());
}

#[tokio::test]
async fn test_update_is_partial() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"result": "updated"}));

    let mut query = client(conn.clone()).query("posts");
    query.routing("tenant-1");
    query
        .update(doc(json!({"_id": "5", "views": 10})))
        .await
        .unwrap();

    match &conn.requests()[0] {
        Recorded::Index(index) => {
            assert!(index.partial);
            assert_eq!(index.id, "5");
            assert_eq!(index.routing.as_deref(), Some("tenant-1"));
        }
        other => panic!("Expected index request, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conflicting_contexts_fail_before_sending() {
    let conn = RecordingConnection::new();
    let mut query = client(conn.clone()).query("questions");
    query.where_child("answer", |c| {
        c.where_eq("accepted", true);
        c.filter(|f| {
            f.where_eq("lang", "en");
        });
    });

    let err = query.get().await.unwrap_err();
    assert!(matches!(err, Error::ConflictingQueryContext { .. }));
    assert!(conn.requests().is_empty());
}

#[tokio::test]
async fn test_inner_hits_grouped_when_enabled() {
    let conn = RecordingConnection::new();
    conn.respond(json!({"hits": {"total": 1, "hits": [{
        "_id": "q1",
        "_source": {"title": "How?"},
        "inner_hits": {"answer": {"hits": {"hits": [{"_id": "a1", "_source": {"body": "Yes"}}]}}}
    }]}}));

    let mut query = client(conn).query("questions");
    query.with_inner_hits();
    let docs = query.get().await.unwrap();
    assert_eq!(
        docs[0]["inner_hits"],
        json!({"answer": [{"_id": "a1", "body": "Yes"}]})
    );
}

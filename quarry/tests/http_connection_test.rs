//! HttpConnection against a local axum server.
//!
//! The server records every request it receives and answers based on the
//! path, so URLs, query parameters and bodies can be checked without a
//! real cluster.

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Json;
use axum::Router;
use quarry::config::ConnectionConfig;
use quarry::dsl::{BulkOperation, BulkRequest, DeleteByQuery, DocumentGet, IndexRequest, SearchBody, SourceFilter};
use quarry::query::{Conflicts, Refresh};
use quarry::{Connection, DslDocument, Error, HttpConnection};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: Option<String>,
    body: String,
    content_type: Option<String>,
}

#[derive(Clone, Default)]
struct AppState {
    seen: Arc<Mutex<Vec<Seen>>>,
}

async fn handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    state.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
        content_type: header("content-type"),
    });

    match uri.path() {
        "/posts/_search" => (
            StatusCode::OK,
            Json(json!({"took": 2, "hits": {"total": {"value": 1}, "hits": [
                {"_id": "1", "_source": {"title": "hello"}}
            ]}})),
        ),
        "/_search/scroll" => (
            StatusCode::OK,
            Json(json!({"_scroll_id": "next", "hits": {"hits": []}})),
        ),
        "/posts/_doc/missing" if method == Method::GET => (
            StatusCode::NOT_FOUND,
            Json(json!({"_id": "missing", "found": false})),
        ),
        "/posts/_doc/a%2Fb%3Fx=1" if method == Method::GET => (
            StatusCode::OK,
            Json(json!({"_id": "a/b?x=1", "found": true, "_source": {}})),
        ),
        "/posts/_doc/1" if method == Method::GET => (
            StatusCode::OK,
            Json(json!({"_id": "1", "found": true, "_source": {"title": "hello"}})),
        ),
        "/busy/_search" => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "busy"})),
        ),
        "/broken/_search" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"type": "parsing_exception"}})),
        ),
        _ => (StatusCode::OK, Json(json!({"acknowledged": true}))),
    }
}

async fn start_server() -> (String, AppState) {
    let state = AppState::default();
    let router = Router::new().fallback(handler).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn connection(url: &str) -> HttpConnection {
    HttpConnection::new(&ConnectionConfig {
        url: format!("{url}/"),
        timeout_secs: 5,
    })
    .unwrap()
}

fn search_request(index: &str) -> DslDocument {
    DslDocument {
        index: index.to_string(),
        body: SearchBody {
            source: SourceFilter::All(true),
            query: Some(json!({"term": {"status": "published"}})),
            post_filter: None,
            aggregations: None,
            sort: None,
            from: None,
            size: Some(10),
        },
        scroll: None,
    }
}

#[tokio::test]
async fn test_search_posts_body() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let response = conn.search(&search_request("posts")).await.unwrap();
    assert_eq!(response["hits"]["hits"][0]["_id"], json!("1"));

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, Method::POST);
    assert_eq!(seen[0].path, "/posts/_search");
    assert_eq!(seen[0].query, None);
    let body: Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(
        body,
        json!({"_source": true, "query": {"term": {"status": "published"}}, "size": 10})
    );
}

#[tokio::test]
async fn test_scroll_requests() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let mut request = search_request("posts");
    request.scroll = Some("1m".to_string());
    conn.search(&request).await.unwrap();
    conn.scroll("abc").await.unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].query.as_deref(), Some("scroll=1m"));
    assert_eq!(seen[1].path, "/_search/scroll");
    let body: Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(body, json!({"scroll": "1m", "scroll_id": "abc"}));
}

#[tokio::test]
async fn test_get_maps_404_to_none() {
    let (url, _state) = start_server().await;
    let conn = connection(&url);

    let found = conn
        .get(&DocumentGet {
            index: "posts".to_string(),
            id: "1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(found.unwrap()["found"], json!(true));

    let missing = conn
        .get(&DocumentGet {
            index: "posts".to_string(),
            id: "missing".to_string(),
        })
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_server_error_is_reported_once() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let err = conn.search(&search_request("busy")).await.unwrap_err();
    assert!(matches!(err, Error::Transport { status: Some(503), .. }));
    assert_eq!(state.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_client_error_carries_body() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let err = conn.search(&search_request("broken")).await.unwrap_err();
    match err {
        Error::Transport { status, body } => {
            assert_eq!(status, Some(400));
            assert!(body.contains("parsing_exception"));
        }
        other => panic!("Expected transport error, got {other:?}"),
    }
    assert_eq!(state.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_by_query_params() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    conn.delete_by_query(&DeleteByQuery {
        index: "posts".to_string(),
        body: search_request("posts").body,
        max_docs: None,
        conflicts: Some(Conflicts::Proceed),
        refresh: Some(Refresh::True),
    })
    .await
    .unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/posts/_delete_by_query");
    assert_eq!(seen[0].query.as_deref(), Some("conflicts=proceed&refresh=true"));
}

#[tokio::test]
async fn test_delete_by_query_sends_max_docs() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let mut body = search_request("posts").body;
    body.size = None;
    conn.delete_by_query(&DeleteByQuery {
        index: "posts".to_string(),
        body,
        max_docs: Some(5),
        conflicts: None,
        refresh: None,
    })
    .await
    .unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].query.as_deref(), Some("max_docs=5"));
    let sent: Value = serde_json::from_str(&seen[0].body).unwrap();
    assert!(sent.get("size").is_none());
    assert!(sent.get("max_docs").is_none());
}

#[tokio::test]
async fn test_clear_scroll_request() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    conn.clear_scroll("abc").await.unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].method, Method::DELETE);
    assert_eq!(seen[0].path, "/_search/scroll");
    let body: Value = serde_json::from_str(&seen[0].body).unwrap();
    assert_eq!(body, json!({"scroll_id": ["abc"]}));
}

#[tokio::test]
async fn test_ids_are_escaped_in_paths() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let found = conn
        .get(&DocumentGet {
            index: "posts".to_string(),
            id: "a/b?x=1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(found.unwrap()["_id"], json!("a/b?x=1"));

    let request = IndexRequest {
        index: "posts".to_string(),
        id: "a/b?x=1".to_string(),
        body: serde_json::Map::new(),
        routing: None,
        parent: None,
        partial: true,
    };
    conn.index(&request).await.unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/posts/_doc/a%2Fb%3Fx=1");
    assert_eq!(seen[0].query, None);
    assert_eq!(seen[1].path, "/posts/_update/a%2Fb%3Fx=1");
    assert_eq!(seen[1].query, None);
}

#[tokio::test]
async fn test_index_and_partial_update() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let mut body = serde_json::Map::new();
    body.insert("title".to_string(), json!("hello"));
    let mut request = IndexRequest {
        index: "posts".to_string(),
        id: "7".to_string(),
        body,
        routing: None,
        parent: Some("p1".to_string()),
        partial: false,
    };
    conn.index(&request).await.unwrap();
    request.partial = true;
    conn.index(&request).await.unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].method, Method::PUT);
    assert_eq!(seen[0].path, "/posts/_doc/7");
    assert_eq!(seen[0].query.as_deref(), Some("routing=p1"));

    assert_eq!(seen[1].method, Method::POST);
    assert_eq!(seen[1].path, "/posts/_update/7");
    let update: Value = serde_json::from_str(&seen[1].body).unwrap();
    assert_eq!(update, json!({"doc": {"title": "hello"}, "doc_as_upsert": true}));
}

#[tokio::test]
async fn test_bulk_sends_ndjson() {
    let (url, state) = start_server().await;
    let conn = connection(&url);

    let mut source = serde_json::Map::new();
    source.insert("title".to_string(), json!("hello"));
    let request = BulkRequest {
        operations: vec![BulkOperation {
            action: json!({"index": {"_index": "posts", "_id": "1"}}),
            source,
        }],
    };
    conn.bulk(&request).await.unwrap();

    let seen = state.seen.lock().unwrap().clone();
    assert_eq!(seen[0].path, "/_bulk");
    assert_eq!(seen[0].content_type.as_deref(), Some("application/x-ndjson"));
    assert_eq!(seen[0].body.lines().count(), 2);
    assert!(seen[0].body.ends_with('\n'));
}

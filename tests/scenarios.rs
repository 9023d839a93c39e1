//! End-to-end HTTP scenarios, driven straight through the `axum::Router`
//! without binding a socket. Mirrors the literal inputs/outputs the core
//! executor, transaction manager, and storage layer are expected to satisfy
//! together (`S1`..`S6`).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value as Json};
use tower::ServiceExt;

use cyphergraph::{Graph, SqliteStore};

async fn test_app() -> axum::Router {
    let store = SqliteStore::connect("sqlite::memory:").await.unwrap();
    let graph = Arc::new(Graph::new(store));
    graph.initialize().await.unwrap();
    cyphergraph::dispatcher::router(graph)
}

async fn post(
    app: &axum::Router,
    path: &str,
    tx_id: Option<&str>,
    body: Json,
) -> (StatusCode, Json) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(tx) = tx_id {
        builder = builder.header("x-transaction-id", tx);
    }
    let req = builder.body(Body::from(body.to_string())).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &axum::Router, path: &str) -> (StatusCode, Json) {
    let req = Request::builder().method("GET").uri(path).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn s1_create_and_retrieve_one_node() {
    let app = test_app().await;
    let (status, body) = post(
        &app,
        "/cypher",
        None,
        json!({"query": "CREATE (n:Person {name: \"Alice\"}) RETURN id(n) as nodeId"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["records"][0]["nodeId"], 1);
    assert_eq!(body["summary"]["counters"]["nodesCreated"], 1);
    assert_eq!(body["summary"]["counters"]["propertiesSet"], 1);
    assert_eq!(body["summary"]["counters"]["labelsAdded"], 1);

    let (status, body) = get(&app, "/node/1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["labels"], json!(["Person"]));
    assert_eq!(body["properties"]["name"], "Alice");
}

#[tokio::test]
async fn s2_transaction_isolation() {
    let app = test_app().await;
    let (_, begin_body) = post(&app, "/transaction/begin", None, json!({})).await;
    let tx = begin_body["transactionId"].as_str().unwrap().to_string();

    let (status, _) = post(
        &app,
        "/cypher",
        Some(&tx),
        json!({"query": "CREATE (n:Person {name: \"Isolated\"})"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let query = json!({"query": "MATCH (n:Person {name: \"Isolated\"}) RETURN n"});

    let (_, body) = post(&app, "/cypher", None, query.clone()).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 0);

    let (_, body) = post(&app, "/cypher", Some(&tx), query.clone()).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 1);

    let (status, _) = post(&app, "/transaction/commit", None, json!({"transactionId": tx})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post(&app, "/cypher", None, query).await;
    assert_eq!(body["records"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn s3_rollback_discards() {
    let app = test_app().await;
    let (_, begin_body) = post(&app, "/transaction/begin", None, json!({})).await;
    let tx = begin_body["transactionId"].as_str().unwrap().to_string();

    post(
        &app,
        "/cypher",
        Some(&tx),
        json!({"query": "CREATE (n:Person {name: \"RolledBack\"})"}),
    )
    .await;

    let (status, _) = post(&app, "/transaction/rollback", None, json!({"transactionId": tx})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = post(
        &app,
        "/cypher",
        None,
        json!({"query": "MATCH (n:Person {name: \"RolledBack\"}) RETURN n"}),
    )
    .await;
    assert_eq!(body["records"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn s4_expiry() {
    let app = test_app().await;
    let (_, begin_body) = post(&app, "/transaction/begin", None, json!({"timeout": 1})).await;
    let tx = begin_body["transactionId"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let (status, body) = post(&app, "/cypher", Some(&tx), json!({"query": "RETURN 1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .to_lowercase()
        .contains("expired"));
}

#[tokio::test]
async fn s5_syntax_error_shape() {
    let app = test_app().await;
    let (status, body) = post(
        &app,
        "/cypher",
        None,
        json!({"query": "INVALID CYPHER SYNTAX!!!"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "Neo.ClientError.Statement.SyntaxError");
    assert!(!body["error"]["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn s6_relationship_traversal() {
    let app = test_app().await;
    post(
        &app,
        "/cypher",
        None,
        json!({"query": "CREATE (a:Person {name:\"A\"})-[:KNOWS]->(b:Person {name:\"B\"})"}),
    )
    .await;

    let (status, body) = post(
        &app,
        "/cypher",
        None,
        json!({"query": "MATCH (x:Person {name:\"A\"})-[:KNOWS]->(y) RETURN y.name"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["y.name"], "B");
}

#[tokio::test]
async fn health_reports_counts() {
    let app = test_app().await;
    post(
        &app,
        "/cypher",
        None,
        json!({"query": "CREATE (n:Person {name: \"Solo\"})"}),
    )
    .await;
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["nodeCount"], 1);
}

#[tokio::test]
async fn missing_node_is_404() {
    let app = test_app().await;
    let (status, body) = get(&app, "/node/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "Neo.ClientError.Statement.EntityNotFound");
}

//! HTTP surface: a thin axum router over `Graph`.
//!
//! Every response body (success or error) is JSON. Errors map to an HTTP
//! status plus a Neo4j-flavored `code`/`message` envelope so a client can
//! branch on `code` without parsing prose.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::storage::GraphStore;
use crate::{Error, Graph, PropertyMap, Value};

const TX_HEADER: &str = "x-transaction-id";

pub fn router<S: GraphStore>(graph: Arc<Graph<S>>) -> Router {
    Router::new()
        .route("/health", get(health::<S>))
        .route("/cypher", post(run_cypher::<S>))
        .route("/transaction/begin", post(begin_tx::<S>))
        .route("/transaction/commit", post(commit_tx::<S>))
        .route("/transaction/rollback", post(rollback_tx::<S>))
        .route("/node/{id}", get(get_node::<S>))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(graph)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthBody {
    status: &'static str,
    initialized: bool,
    schema_version: i64,
    node_count: u64,
    relationship_count: u64,
}

async fn health<S: GraphStore>(State(graph): State<Arc<Graph<S>>>) -> Response {
    let storage = graph.storage();
    Json(HealthBody {
        status: "ok",
        initialized: storage.is_connected(),
        schema_version: storage.schema_version().await.unwrap_or_default(),
        node_count: storage.node_count().await.unwrap_or_default(),
        relationship_count: storage.relationship_count().await.unwrap_or_default(),
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct CypherRequest {
    query: String,
    #[serde(default)]
    parameters: HashMap<String, serde_json::Value>,
}

async fn run_cypher<S: GraphStore>(
    State(graph): State<Arc<Graph<S>>>,
    headers: HeaderMap,
    body: Result<Json<CypherRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(j) => j,
        Err(_) => return bad_request("request body is not valid JSON"),
    };
    if req.query.trim().is_empty() {
        return bad_request("`query` must not be empty");
    }
    let params: PropertyMap = req
        .parameters
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();

    let tx_id = tx_id_from_headers(&headers);
    let result = match tx_id {
        Some(tx_id) => graph.run_in_tx(tx_id, &req.query, params).await,
        None => graph.run(&req.query, params).await,
    };

    match result {
        Ok(result) => Json(CypherResponse {
            records: result.records,
            summary: Summary {
                counters: result.counters,
            },
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Serialize)]
struct CypherResponse {
    records: Vec<crate::Row>,
    summary: Summary,
}

#[derive(Debug, Serialize)]
struct Summary {
    counters: crate::Counters,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BeginRequest {
    timeout: Option<u64>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BeginResponse {
    transaction_id: String,
}

async fn begin_tx<S: GraphStore>(
    State(graph): State<Arc<Graph<S>>>,
    body: axum::body::Bytes,
) -> Response {
    let req: BeginRequest = if body.is_empty() {
        BeginRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(b) => b,
            Err(_) => return bad_request("request body is not valid JSON"),
        }
    };
    let metadata: PropertyMap = req
        .metadata
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect();
    let transaction_id = graph.begin(Some(crate::BeginConfig {
        timeout_ms: req.timeout,
        metadata,
    }));
    Json(BeginResponse { transaction_id }).into_response()
}

#[derive(Debug, Serialize)]
struct SuccessBody {
    success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionIdBody {
    transaction_id: String,
}

async fn commit_tx<S: GraphStore>(State(graph): State<Arc<Graph<S>>>, body: axum::body::Bytes) -> Response {
    let tx_id = match transaction_id_from_body(&body) {
        Ok(tx_id) => tx_id,
        Err(resp) => return resp,
    };
    match graph.commit(&tx_id).await {
        Ok(()) => Json(SuccessBody { success: true }).into_response(),
        Err(e) => error_response(e),
    }
}

async fn rollback_tx<S: GraphStore>(State(graph): State<Arc<Graph<S>>>, body: axum::body::Bytes) -> Response {
    let tx_id = match transaction_id_from_body(&body) {
        Ok(tx_id) => tx_id,
        Err(resp) => return resp,
    };
    match graph.rollback(&tx_id) {
        Ok(()) => Json(SuccessBody { success: true }).into_response(),
        Err(e) => error_response(e),
    }
}

fn transaction_id_from_body(body: &[u8]) -> std::result::Result<String, Response> {
    let req: TransactionIdBody = serde_json::from_slice(body)
        .map_err(|_| bad_request("request body must be JSON `{transactionId}`"))?;
    if req.transaction_id.is_empty() {
        return Err(bad_request("`transactionId` must not be empty"));
    }
    Ok(req.transaction_id)
}

#[derive(Debug, Serialize)]
struct NodeBody {
    id: u64,
    labels: Vec<String>,
    properties: PropertyMap,
}

async fn get_node<S: GraphStore>(State(graph): State<Arc<Graph<S>>>, Path(id): Path<u64>) -> Response {
    match graph.storage().get_node(crate::NodeId(id)).await {
        Ok(Some(node)) => Json(NodeBody {
            id: node.id.0,
            labels: node.labels.into_iter().collect(),
            properties: node.properties,
        })
        .into_response(),
        Ok(None) => error_response(Error::NotFound(format!("node {id}"))),
        Err(e) => error_response(e),
    }
}

fn tx_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(TX_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
}

fn bad_request(message: &str) -> Response {
    error_response(Error::SemanticError(message.to_string()))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn error_response(err: Error) -> Response {
    let status = match &err {
        Error::SyntaxError { .. }
        | Error::SemanticError(_)
        | Error::ParameterMissing(_)
        | Error::TransactionError(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        Error::StorageError(_) | Error::Io(_) | Error::General(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorBody {
        error: ErrorDetail {
            code: err.code(),
            message: err.to_string(),
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error_response(self)
    }
}

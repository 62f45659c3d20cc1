//! HTTP Surface (C5) — the node's REST API.
//!
//! Router layout and response-envelope conventions follow the teacher's
//! `http_api.rs`; the auth convention differs deliberately — peers send a raw
//! bearer token in `Authorization` (no `Bearer ` prefix), matching the
//! cluster's own token format rather than the teacher's OAuth-style header.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::distributor::{self, SetRequest};
use crate::error::NodeError;
use crate::node::Node;
use crate::store::{Entry, GetResult};

pub fn api_routes() -> Router<Arc<Node>> {
    Router::new()
        .route("/auth", post(auth))
        .route("/set", post(set))
        .route("/get", post(get_handler))
        .route("/mkcluster", post(mkcluster))
        .route("/registernode", post(registernode))
        .route("/registerkey", post(registerkey))
        .route("/clusterinfo", get(clusterinfo))
}

fn extract_token(headers: &HeaderMap) -> Result<String, NodeError> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or(NodeError::Unauthorized)
}

async fn require_auth(node: &Node, headers: &HeaderMap) -> Result<String, NodeError> {
    let token = extract_token(headers)?;
    if node.tokens.is_valid(&token).await {
        Ok(token)
    } else {
        Err(NodeError::Unauthorized)
    }
}

/// Unwrap a fallible JSON extraction, converting axum's own rejection (a
/// missing/mistyped field, invalid JSON) into the spec's `Malformed` error
/// rather than letting axum's default 400/422 plain-text response leak out.
fn require_json<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, NodeError> {
    body.map(|Json(inner)| inner)
        .map_err(|rejection| NodeError::Malformed(rejection.to_string()))
}

// --- /auth -------------------------------------------------------------

async fn auth(State(node): State<Arc<Node>>) -> Response {
    let token = Uuid::new_v4().to_string();
    if let Err(e) = node.tokens.add(&token).await {
        return NodeError::Storage(e).into_response();
    }
    info!(token = %token, "minted new api key");

    distributor::broadcast_register_key(&node.peers, &token).await;

    (StatusCode::OK, Json(json!({ "api-key": token }))).into_response()
}

// --- /set ----------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
struct SetBody {
    #[serde(rename = "db_name")]
    db: String,
    keys: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct EndpointFlag {
    #[serde(default)]
    is_endpoint: bool,
}

async fn set(
    State(node): State<Arc<Node>>,
    Query(flag): Query<EndpointFlag>,
    headers: HeaderMap,
    body: Result<Json<SetBody>, JsonRejection>,
) -> Response {
    let body = match require_json(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let token = match require_auth(&node, &headers).await {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    if let Err(e) = node.store.add_keys(&token, &body.db, body.keys.clone()).await {
        return NodeError::Storage(e).into_response();
    }

    if !flag.is_endpoint {
        let broadcast = SetRequest {
            token: token.clone(),
            db: body.db.clone(),
            entries: body.keys.clone(),
        };
        distributor::broadcast_set(&node.peers, &broadcast, &token).await;
    }

    (StatusCode::OK, Json(body)).into_response()
}

// --- /get ------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GetBody {
    #[serde(rename = "db_name")]
    db: String,
    keys: Vec<String>,
    #[serde(default)]
    without_key: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GetResponseBody {
    entries: HashMap<String, Entry>,
    not_found_keys: Vec<String>,
}

fn get_response(result: GetResult) -> Response {
    let status = if result.not_found_keys.is_empty() || !result.entries.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (
        status,
        Json(GetResponseBody {
            entries: result.entries,
            not_found_keys: result.not_found_keys,
        }),
    )
        .into_response()
}

async fn get_handler(
    State(node): State<Arc<Node>>,
    headers: HeaderMap,
    body: Result<Json<GetBody>, JsonRejection>,
) -> Response {
    let body = match require_json(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let token = match require_auth(&node, &headers).await {
        Ok(t) => t,
        Err(e) => return e.into_response(),
    };

    let local = node.store.get(&token, &body.db, &body.keys).await;
    if local.not_found_keys.is_empty() {
        return get_response(local);
    }

    let mut without_key = body.without_key;
    if !without_key.iter().any(|u| u == node.peers.self_url()) {
        without_key.push(node.peers.self_url().to_string());
    }

    let remote = distributor::quorum_get(&node.peers, &token, &body.db, &local.not_found_keys, &without_key).await;

    let mut merged = local;
    merged.not_found_keys = remote.not_found_keys;
    merged.entries.extend(remote.entries);

    get_response(merged)
}

// --- /mkcluster --------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MkClusterBody {
    sender_address: String,
}

#[derive(Debug, Serialize)]
struct MkClusterResponseBody {
    addresses: Vec<String>,
    #[serde(rename = "api-keys")]
    api_keys: Vec<String>,
}

async fn mkcluster(
    State(node): State<Arc<Node>>,
    body: Result<Json<MkClusterBody>, JsonRejection>,
) -> Response {
    let body = match require_json(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    let sender = body.sender_address;

    // Response is computed from the peer set as it stood before the sender
    // joins — the sender doesn't need to be told about itself.
    let mut addresses = node.peers.snapshot().await;
    addresses.push(node.peers.self_url().to_string());
    addresses.retain(|a| a != &sender);
    let api_keys = node.tokens.list().await;

    node.peers.announce(&sender).await;
    node.peers.add(std::iter::once(sender.clone())).await;

    info!(sender = %sender, "admitted new cluster member");

    (
        StatusCode::OK,
        Json(MkClusterResponseBody { addresses, api_keys }),
    )
        .into_response()
}

// --- /registernode -----------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RegisterNodeBody {
    address: Vec<String>,
}

async fn registernode(
    State(node): State<Arc<Node>>,
    body: Result<Json<RegisterNodeBody>, JsonRejection>,
) -> Response {
    let body = match require_json(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    node.peers.add(body.address.clone()).await;
    (StatusCode::OK, Json(body)).into_response()
}

// --- /registerkey --------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
struct RegisterKeyBody {
    token: String,
}

async fn registerkey(
    State(node): State<Arc<Node>>,
    body: Result<Json<RegisterKeyBody>, JsonRejection>,
) -> Response {
    let body = match require_json(body) {
        Ok(b) => b,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = node.tokens.add(&body.token).await {
        return NodeError::Storage(e).into_response();
    }
    (StatusCode::OK, Json(body)).into_response()
}

// --- /clusterinfo --------------------------------------------------------

async fn clusterinfo(State(node): State<Arc<Node>>) -> Response {
    let mut addresses = node.peers.snapshot().await;
    addresses.push(node.peers.self_url().to_string());
    (StatusCode::OK, Json(json!({ "addresses": addresses }))).into_response()
}

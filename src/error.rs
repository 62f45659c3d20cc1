//! Node-wide error type — maps the error kinds in the node's design to HTTP
//! status codes at a single boundary, so handlers don't hand-roll status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

/// Errors a request handler can produce. Every variant maps to exactly one
/// HTTP status; peer-unreachable and quorum-miss are handled inline by the
/// distributor rather than through this type, since they carry response
/// payloads (`not_found_keys`) the generic `{message}` envelope can't express.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        let status = match &self {
            NodeError::Unauthorized => StatusCode::UNAUTHORIZED,
            NodeError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

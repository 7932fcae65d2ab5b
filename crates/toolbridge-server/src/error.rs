use axum::http::StatusCode;
use serde_json::Value;

use crate::rpc::{self, RpcResponse};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session limit reached ({limit} open)")]
    Exhausted { limit: usize },
}

/// Per-call failures the router reports as protocol-level errors.
///
/// Tool failures are not here: they are successful RPC results with `isError`.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("malformed envelope: {message}")]
    MalformedEnvelope {
        message: String,
        /// Whatever id could be salvaged from the body.
        id: Option<Value>,
        /// Body was not JSON at all.
        unparseable: bool,
    },
}

impl RouterError {
    pub fn code(&self) -> i32 {
        match self {
            Self::SessionNotFound(_) => rpc::SESSION_NOT_FOUND,
            Self::MalformedEnvelope { unparseable: true, .. } => rpc::PARSE_ERROR,
            Self::MalformedEnvelope { .. } => rpc::INVALID_REQUEST,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::MalformedEnvelope { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// JSON-RPC error body, echoing `id` when the caller's id is known.
    pub fn to_response(&self, id: Option<Value>) -> RpcResponse {
        let id = match self {
            Self::MalformedEnvelope { id: salvaged, .. } => salvaged.clone(),
            Self::SessionNotFound(_) => id,
        };
        RpcResponse::error(id, self.code(), self.to_string())
    }
}

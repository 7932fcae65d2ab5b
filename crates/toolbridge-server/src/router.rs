//! JSON-RPC dispatch for `POST /messages`.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};
use toolbridge_core::tools::{ToolError, ToolExecutor};
use tracing::{debug, warn};

use crate::error::RouterError;
use crate::rpc::{self, methods, RpcRequest, RpcResponse, JSONRPC_VERSION};
use crate::session::SessionRegistry;
use crate::stream::{initialize_result, ServerInfo};

/// What the HTTP layer should send back for one envelope.
#[derive(Debug)]
pub enum RouteOutcome {
    /// Answered inline.
    Reply(RpcResponse),
    /// Accepted; the result will arrive on the session's stream.
    Queued,
    /// Rejected before dispatch.
    Failed {
        error: RouterError,
        response: RpcResponse,
    },
}

impl RouteOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Reply(_) => StatusCode::OK,
            Self::Queued => StatusCode::ACCEPTED,
            Self::Failed { error, .. } => error.http_status(),
        }
    }

    fn failed(error: RouterError, id: Option<Value>) -> Self {
        let response = error.to_response(id);
        Self::Failed { error, response }
    }
}

pub struct RpcRouter {
    executor: Arc<dyn ToolExecutor>,
    sessions: Arc<SessionRegistry>,
    info: ServerInfo,
}

impl RpcRouter {
    pub fn new(
        executor: Arc<dyn ToolExecutor>,
        sessions: Arc<SessionRegistry>,
        info: ServerInfo,
    ) -> Self {
        Self {
            executor,
            sessions,
            info,
        }
    }

    /// Route one raw request body, optionally addressed to a session.
    pub async fn handle(&self, session_id: Option<&str>, body: &[u8]) -> RouteOutcome {
        let request = match parse_envelope(body) {
            Ok(request) => request,
            Err(error) => {
                warn!(error = %error, "rejected envelope");
                return RouteOutcome::failed(error, None);
            }
        };

        let RpcRequest {
            method, params, id, ..
        } = request;
        let params = params.unwrap_or_else(|| json!({}));
        debug!(method = %method, session_id = session_id.unwrap_or("-"), "rpc request");

        match method.as_str() {
            methods::TOOLS_LIST => RouteOutcome::Reply(self.tools_list(id)),
            methods::TOOLS_CALL => match self.tools_call(session_id, &params, id.clone()).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(error = %error, "tools/call rejected");
                    RouteOutcome::failed(error, id)
                }
            },
            methods::INITIALIZE => {
                RouteOutcome::Reply(RpcResponse::success(id, initialize_result(&self.info)))
            }
            // ping and anything unrecognized
            _ => RouteOutcome::Reply(RpcResponse::empty(id)),
        }
    }

    fn tools_list(&self, id: Option<Value>) -> RpcResponse {
        RpcResponse::success(id, json!({ "tools": self.executor.definitions() }))
    }

    async fn tools_call(
        &self,
        session_id: Option<&str>,
        params: &Value,
        id: Option<Value>,
    ) -> Result<RouteOutcome, RouterError> {
        let name = rpc::optional_str(params, "name").map(str::to_owned);
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let Some(session_id) = session_id else {
            let response = run_tool(self.executor.as_ref(), name.as_deref(), args, id).await;
            return Ok(RouteOutcome::Reply(response));
        };

        let not_found = || RouterError::SessionNotFound(session_id.to_string());
        let session = self.sessions.lookup(session_id).map_err(|_| not_found())?;
        session.touch();
        let reservation = session.reserve(id).map_err(|_| not_found())?;

        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            let id = reservation.id().cloned();
            let response = run_tool(executor.as_ref(), name.as_deref(), args, id).await;
            reservation.complete(response);
        });

        Ok(RouteOutcome::Queued)
    }
}

fn parse_envelope(body: &[u8]) -> Result<RpcRequest, RouterError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| RouterError::MalformedEnvelope {
        message: e.to_string(),
        id: None,
        unparseable: true,
    })?;

    let salvaged = value.get("id").cloned();
    let request: RpcRequest =
        serde_json::from_value(value).map_err(|e| RouterError::MalformedEnvelope {
            message: e.to_string(),
            id: salvaged.clone(),
            unparseable: false,
        })?;

    if let Some(version) = request.jsonrpc.as_deref() {
        if version != JSONRPC_VERSION {
            return Err(RouterError::MalformedEnvelope {
                message: format!("unsupported jsonrpc version: {version}"),
                id: salvaged,
                unparseable: false,
            });
        }
    }
    Ok(request)
}

/// Execute a tool and wrap the outcome as an RPC result. Tool failures are
/// successful responses flagged with `isError`.
async fn run_tool(
    executor: &dyn ToolExecutor,
    name: Option<&str>,
    args: Value,
    id: Option<Value>,
) -> RpcResponse {
    let Some(name) = name else {
        return RpcResponse::tool_error(id, "Unknown tool: missing name");
    };

    match executor.execute(name, args).await {
        Ok(output) => RpcResponse::tool_text(id, output.text),
        Err(ToolError::NotFound(name)) => {
            RpcResponse::tool_error(id, format!("Unknown tool: {name}"))
        }
        Err(e) => {
            warn!(tool = name, kind = e.error_kind(), error = %e, "tool failed");
            RpcResponse::tool_error(id, format!("Error: {e}"))
        }
    }
}

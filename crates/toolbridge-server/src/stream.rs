//! Per-connection event stream.
//!
//! Transport-agnostic: yields [`Message`]s and leaves framing to the HTTP
//! layer.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use serde_json::{json, Value};
use toolbridge_core::ids::SessionId;

use crate::rpc::JSONRPC_VERSION;
use crate::session::{Message, SessionGuard};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name and version reported in the handshake.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// Result body of `initialize`, without session metadata.
pub fn initialize_result(info: &ServerInfo) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {"tools": {}},
        "serverInfo": {"name": info.name, "version": info.version},
    })
}

/// The first frame of every stream: an `initialize`-shaped result carrying
/// the session id and where to POST.
pub fn handshake_payload(session_id: &SessionId, endpoint: &str, info: &ServerInfo) -> Value {
    let mut result = initialize_result(info);
    result["_meta"] = json!({
        "sessionId": session_id,
        "messageEndpoint": format!("{endpoint}?session_id={session_id}"),
    });
    json!({"jsonrpc": JSONRPC_VERSION, "id": 0, "result": result})
}

/// Stream the handshake, then queued results, with a keepalive after each
/// `keepalive` of silence. Ends when the session queue is closed; dropping
/// the stream destroys the session.
pub fn event_stream(
    guard: SessionGuard,
    endpoint: String,
    info: ServerInfo,
    keepalive: Duration,
) -> impl Stream<Item = Message> + Send + 'static {
    stream! {
        let session = Arc::clone(guard.session());
        yield Message::handshake(handshake_payload(session.id(), &endpoint, &info));

        loop {
            if let Some(message) = session.queue().pop_ready() {
                session.touch();
                yield message;
                continue;
            }
            if session.queue().is_closed() {
                break;
            }

            let timed_out = tokio::select! {
                () = session.queue().changed() => false,
                () = tokio::time::sleep(keepalive) => true,
            };
            if timed_out {
                yield Message::keepalive();
            }
        }

        tracing::debug!(session_id = %session.id(), "event stream finished");
        drop(guard);
    }
}

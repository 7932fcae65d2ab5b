use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Method names recognized by the router.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response: exactly one of `result` / `error` is present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const INTERNAL_ERROR: i32 = -32603;
// Server-defined range
pub const SESSION_NOT_FOUND: i32 = -32001;
pub const SERVER_BUSY: i32 = -32002;

impl RpcResponse {
    /// A missing id is echoed as `null`.
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn internal_error(id: Option<Value>, msg: impl Into<String>) -> Self {
        Self::error(id, INTERNAL_ERROR, msg)
    }

    /// `{}`, the reply to methods the router does not implement.
    pub fn empty(id: Option<Value>) -> Self {
        Self::success(id, Value::Object(serde_json::Map::new()))
    }

    /// Tool output wrapped as MCP text content.
    pub fn tool_text(id: Option<Value>, text: impl Into<String>) -> Self {
        Self::success(
            id,
            serde_json::json!({
                "content": [{"type": "text", "text": text.into()}]
            }),
        )
    }

    /// A tool-level failure: still a successful RPC, flagged with `isError`.
    pub fn tool_error(id: Option<Value>, text: impl Into<String>) -> Self {
        Self::success(
            id,
            serde_json::json!({
                "content": [{"type": "text", "text": text.into()}],
                "isError": true
            }),
        )
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Extract an optional string param.
pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rpc_request() {
        let json = r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"explicar_codigo"},"id":1}"#;
        let req: RpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "tools/call");
        assert_eq!(req.jsonrpc.as_deref(), Some("2.0"));
        assert!(req.params.is_some());
        assert_eq!(req.id, Some(serde_json::json!(1)));
    }

    #[test]
    fn parse_notification_without_id() {
        let req: RpcRequest = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert!(req.id.is_none());
        assert!(req.params.is_none());
    }

    #[test]
    fn request_without_method_rejected() {
        assert!(serde_json::from_str::<RpcRequest>(r#"{"id":1}"#).is_err());
    }

    #[test]
    fn success_response_serializes() {
        let resp = RpcResponse::success(Some(serde_json::json!("abc")), serde_json::json!({"ok": true}));
        let json = resp.to_value();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], "abc");
        assert_eq!(json["result"]["ok"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn missing_id_serializes_as_null() {
        let json = RpcResponse::empty(None).to_value();
        assert!(json["id"].is_null());
        assert_eq!(json["result"], serde_json::json!({}));
    }

    #[test]
    fn error_response_serializes() {
        let resp = RpcResponse::error(Some(serde_json::json!(7)), SESSION_NOT_FOUND, "gone");
        let json = resp.to_value();
        assert_eq!(json["error"]["code"], -32001);
        assert_eq!(json["error"]["message"], "gone");
        assert!(json.get("result").is_none());
        assert!(resp.result.is_none());
    }

    #[test]
    fn tool_text_shape() {
        let json = RpcResponse::tool_text(Some(serde_json::json!(2)), "hello").to_value();
        assert_eq!(json["result"]["content"][0]["type"], "text");
        assert_eq!(json["result"]["content"][0]["text"], "hello");
        assert!(json["result"].get("isError").is_none());
    }

    #[test]
    fn tool_error_is_successful_rpc() {
        let resp = RpcResponse::tool_error(Some(serde_json::json!(3)), "nope");
        assert!(resp.error.is_none());
        let json = resp.to_value();
        assert_eq!(json["result"]["isError"], true);
        assert_eq!(json["result"]["content"][0]["text"], "nope");
    }
}

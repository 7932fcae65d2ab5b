//! End-to-end tests against a live server on an ephemeral port.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use toolbridge_server::rpc;
use toolbridge_server::{start, ServerConfig, ServerHandle};

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

async fn boot() -> (ServerHandle, String) {
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        keepalive_interval_secs: 1,
        ..Default::default()
    };
    let handle = start(&config, Arc::new(toolbridge_tools::create_default_registry()))
        .await
        .unwrap();
    let base = format!("http://127.0.0.1:{}", handle.port);
    (handle, base)
}

/// Minimal SSE reader: splits on blank lines and parses `data:` payloads.
struct SseClient {
    body: ByteStream,
    buf: String,
}

impl SseClient {
    async fn connect(base: &str) -> Self {
        let resp = reqwest::get(format!("{base}/sse")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let headers = resp.headers();
        assert!(headers["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));
        assert_eq!(headers["cache-control"], "no-cache");
        Self {
            body: Box::pin(resp.bytes_stream()),
            buf: String::new(),
        }
    }

    /// Next frame, or `None` once the server closes the stream.
    async fn next_frame(&mut self) -> Option<Value> {
        loop {
            if let Some(pos) = self.buf.find("\n\n") {
                let frame: String = self.buf.drain(..pos + 2).collect();
                let data: Vec<&str> = frame
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if data.is_empty() {
                    continue;
                }
                return Some(serde_json::from_str(&data.join("\n")).unwrap());
            }
            let chunk = tokio::time::timeout(Duration::from_secs(10), self.body.next())
                .await
                .expect("timed out waiting for frame")?
                .ok()?;
            self.buf.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    async fn handshake(&mut self) -> String {
        let frame = self.next_frame().await.unwrap();
        assert_eq!(frame["id"], 0);
        frame["result"]["_meta"]["messageEndpoint"]
            .as_str()
            .unwrap()
            .to_string()
    }

    /// Next non-keepalive frame.
    async fn next_result(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await.expect("stream ended");
            if frame.get("keepalive").is_none() {
                return frame;
            }
        }
    }
}

async fn post(url: &str, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

async fn session_count(base: &str) -> u64 {
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["sessions"].as_u64().unwrap()
}

#[tokio::test]
async fn handshake_advertises_session() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;

    let frame = sse.next_frame().await.unwrap();
    let meta = &frame["result"]["_meta"];
    let sid = meta["sessionId"].as_str().unwrap();
    assert!(sid.starts_with("sess_"));
    assert_eq!(meta["messageEndpoint"], format!("/messages?session_id={sid}"));
    assert_eq!(frame["result"]["capabilities"], json!({"tools": {}}));
    assert_eq!(frame["result"]["serverInfo"]["name"], "toolbridge");
    assert_eq!(session_count(&base).await, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn idle_stream_receives_keepalive() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    sse.handshake().await;

    let frame = sse.next_frame().await.unwrap();
    assert_eq!(frame, json!({"keepalive": true}));

    handle.shutdown().await;
}

#[tokio::test]
async fn tools_list_is_inline() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    let endpoint = sse.handshake().await;

    let resp = post(
        &format!("{base}{endpoint}"),
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#,
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["analisar_codigo", "explicar_codigo", "gerar_codigo", "refatorar_codigo"]
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn queued_calls_arrive_over_stream_in_order() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    let url = format!("{base}{}", sse.handshake().await);

    let first = post(
        &url,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"analisar_codigo","arguments":{"codigo":"print(1)","linguagem":"python"}}}"#,
    )
    .await;
    assert_eq!(first.status(), 202);
    assert!(first.bytes().await.unwrap().is_empty());

    let second = post(
        &url,
        r#"{"jsonrpc":"2.0","id":"two","method":"tools/call","params":{"name":"gerar_codigo","arguments":{"descricao":"a todo list","linguagem":"sql"}}}"#,
    )
    .await;
    assert_eq!(second.status(), 202);

    let r1 = sse.next_result().await;
    assert_eq!(r1["id"], 1);
    let text = r1["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("PYTHON"));
    assert!(text.contains("print(1)"));

    let r2 = sse.next_result().await;
    assert_eq!(r2["id"], "two");
    assert!(r2["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("SQL"));

    handle.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_over_stream_is_tool_error() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    let url = format!("{base}{}", sse.handshake().await);

    let resp = post(
        &url,
        r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"format_disk"}}"#,
    )
    .await;
    assert_eq!(resp.status(), 202);

    let result = sse.next_result().await;
    assert_eq!(result["id"], 7);
    assert_eq!(result["result"]["isError"], true);
    assert!(result.get("error").is_none());

    handle.shutdown().await;
}

#[tokio::test]
async fn inline_call_without_session() {
    let (handle, base) = boot().await;

    let resp = post(
        &format!("{base}/messages"),
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"explicar_codigo","arguments":{"codigo":"x = 1"}}}"#,
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], 3);
    assert!(body["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("x = 1"));

    handle.shutdown().await;
}

#[tokio::test]
async fn missing_arguments_use_defaults() {
    let (handle, base) = boot().await;

    let resp = post(
        &format!("{base}/messages"),
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"gerar_codigo"}}"#,
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["result"].get("isError").is_none());
    assert!(body["result"]["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("GENERATED CODE - PYTHON"));

    handle.shutdown().await;
}

#[tokio::test]
async fn disconnect_destroys_session() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    let url = format!("{base}{}", sse.handshake().await);
    assert_eq!(session_count(&base).await, 1);

    drop(sse);

    // Noticed on the next failed keepalive write
    let mut remaining = 50;
    while session_count(&base).await > 0 {
        remaining -= 1;
        assert!(remaining > 0, "session outlived its stream");
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let resp = post(
        &url,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"explicar_codigo","arguments":{"codigo":"x"}}}"#,
    )
    .await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["id"], 4);
    assert_eq!(body["error"]["code"], rpc::SESSION_NOT_FOUND);

    handle.shutdown().await;
}

#[tokio::test]
async fn malformed_bodies_rejected() {
    let (handle, base) = boot().await;
    let url = format!("{base}/messages");

    let resp = post(&url, "this is not json").await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], rpc::PARSE_ERROR);
    assert!(body["id"].is_null());

    let resp = post(&url, r#"{"jsonrpc":"2.0","id":12}"#).await;
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], rpc::INVALID_REQUEST);
    assert_eq!(body["id"], 12);

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let (handle, base) = boot().await;
    let mut sse = SseClient::connect(&base).await;
    sse.handshake().await;

    handle.shutdown().await;

    let mut ended = false;
    for _ in 0..5 {
        match sse.next_frame().await {
            None => {
                ended = true;
                break;
            }
            Some(frame) => assert_eq!(frame, json!({"keepalive": true})),
        }
    }
    assert!(ended, "stream still open after shutdown");
}

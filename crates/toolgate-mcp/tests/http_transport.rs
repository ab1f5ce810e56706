//! Streaming-HTTP transport against a local tool server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use toolgate_core::{InjectedAuth, ServerConfig};
use toolgate_mcp::{StreamableHttpTransport, Transport, TransportError, TransportTimeouts};

const SESSION: &str = "sess-42";

#[derive(Debug, Clone)]
struct Seen {
    method: String,
    session: Option<String>,
    authorization: Option<String>,
    query: Option<String>,
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Seen>>>,
}

impl Recorder {
    fn record(&self, method: &str, uri: &Uri, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.seen.lock().unwrap().push(Seen {
            method: method.to_string(),
            session: header("mcp-session-id"),
            authorization: header("authorization"),
            query: uri.query().map(str::to_string),
        });
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn reply(id: &Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

async fn handle_post(
    State(recorder): State<Recorder>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let method = body["method"].as_str().unwrap_or_default().to_string();
    recorder.record(&method, &uri, &headers);
    let id = &body["id"];

    match method.as_str() {
        "initialize" => (
            [("mcp-session-id", SESSION)],
            Json(reply(id, json!({ "protocolVersion": "2024-11-05", "capabilities": {} }))),
        )
            .into_response(),
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => {
            // Answered on an event stream, after an unrelated notification.
            let tools = reply(
                id,
                json!({ "tools": [{ "name": "echo", "description": "Echo", "inputSchema": { "type": "object" } }] }),
            );
            let progress = json!({ "jsonrpc": "2.0", "method": "notifications/progress" });
            let body = format!(
                ": keep-alive\r\n\r\nevent: message\r\ndata: {progress}\r\n\r\nevent: message\r\ndata: {tools}\r\n\r\n"
            );
            ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
        }
        "tools/call" if body["params"]["name"] == "fail" => Json(reply(
            id,
            json!({ "content": [{ "type": "text", "text": "channel_not_found" }], "isError": true }),
        ))
        .into_response(),
        "tools/call" => {
            let text = format!("echo {}", body["params"]["arguments"]);
            Json(reply(id, json!({ "content": [{ "type": "text", "text": text }] }))).into_response()
        }
        _ => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }))
        .into_response(),
    }
}

async fn handle_delete(State(recorder): State<Recorder>, uri: Uri, headers: HeaderMap) -> StatusCode {
    recorder.record("DELETE", &uri, &headers);
    StatusCode::NO_CONTENT
}

async fn serve(recorder: Recorder) -> SocketAddr {
    let app = Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .with_state(recorder);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn transport(addr: SocketAddr) -> StreamableHttpTransport {
    let config = ServerConfig::streamable_http("echo", "Echo", format!("http://{addr}/mcp"));
    let mut auth = InjectedAuth::default();
    auth.headers.insert("Authorization".into(), "Bearer secret".into());
    auth.query.insert("appid".into(), "k1".into());
    StreamableHttpTransport::new(&config, &auth, reqwest::Client::new(), TransportTimeouts::default())
        .unwrap()
}

#[tokio::test]
async fn session_id_is_echoed_and_terminated() {
    let recorder = Recorder::default();
    let addr = serve(recorder.clone()).await;
    let mut transport = transport(addr);

    transport.connect().await.unwrap();
    assert!(transport.is_connected());

    let tools = transport.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = transport.call_tool("echo", json!({ "x": 1 })).await.unwrap();
    assert_eq!(result.to_text(), r#"echo {"x":1}"#);

    transport.disconnect().await;
    assert!(!transport.is_connected());

    let seen = recorder.seen();
    let methods: Vec<&str> = seen.iter().map(|s| s.method.as_str()).collect();
    assert_eq!(
        methods,
        ["initialize", "notifications/initialized", "tools/list", "tools/call", "DELETE"]
    );
    assert_eq!(seen[0].session, None);
    for request in &seen[1..] {
        assert_eq!(request.session.as_deref(), Some(SESSION), "{}", request.method);
    }
    for request in &seen {
        assert_eq!(request.authorization.as_deref(), Some("Bearer secret"));
        assert_eq!(request.query.as_deref(), Some("appid=k1"));
    }
}

#[tokio::test]
async fn tool_failures_are_tool_errors_and_session_ends_once() {
    let recorder = Recorder::default();
    let addr = serve(recorder.clone()).await;
    let mut transport = transport(addr);
    transport.connect().await.unwrap();

    let err = transport.call_tool("fail", json!({})).await.unwrap_err();
    assert!(matches!(&err, TransportError::Tool(message) if message == "channel_not_found"));

    transport.disconnect().await;
    transport.disconnect().await;
    let deletes = recorder.seen().iter().filter(|s| s.method == "DELETE").count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn unreachable_server_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut transport = transport(addr);
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::Connection(_)));
    assert!(!transport.is_connected());
}

//! Server-sent-events transport.
//!
//! The client holds a `GET` event stream open. The server's first `endpoint`
//! event names the URL requests are `POST`ed to; responses come back on the
//! stream as `message` events and are routed to the waiting request by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use toolgate_core::{InjectedAuth, ServerConfig, ToolInfo, ToolResult, TransportKind};
use url::Url;

use super::event_stream::SseDecoder;
use super::http::{check_status, header_map, request_error, server_url};
use super::{Transport, TransportError, TransportTimeouts};
use crate::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport for servers speaking MCP over server-sent events.
pub struct SseTransport {
    server_id: String,
    url: Url,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    client: reqwest::Client,
    timeouts: TransportTimeouts,
    endpoint: Option<Url>,
    pending: PendingMap,
    reader: Option<JoinHandle<()>>,
    next_id: AtomicU64,
}

impl SseTransport {
    /// Build an unconnected transport.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Connection` for a missing or invalid URL or header.
    pub fn new(
        config: &ServerConfig,
        auth: &InjectedAuth,
        client: reqwest::Client,
        timeouts: TransportTimeouts,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            server_id: config.id.clone(),
            url: server_url(config)?,
            headers: header_map(&auth.headers)?,
            query: auth
                .query
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            client,
            timeouts,
            endpoint: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reader: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Open the event stream and wait for the `endpoint` event.
    async fn open_stream(&mut self) -> Result<Url, TransportError> {
        let limit = self.timeouts.connect;
        let response = self
            .client
            .get(self.url.clone())
            .query(&self.query)
            .headers(self.headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| request_error(&e, "event stream", limit))?;
        let response = check_status(response, "event stream")?;

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        self.reader = Some(tokio::spawn(read_events(
            response,
            self.server_id.clone(),
            Arc::clone(&self.pending),
            endpoint_tx,
        )));

        let path = endpoint_rx.await.map_err(|_| {
            TransportError::Connection("event stream closed before endpoint event".to_string())
        })?;
        self.url.join(path.trim()).map_err(|e| {
            TransportError::Protocol(format!("invalid endpoint '{path}': {e}"))
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        endpoint: &Url,
        message: &T,
        operation: &str,
        limit: Duration,
    ) -> Result<(), TransportError> {
        let response = self
            .client
            .post(endpoint.clone())
            .query(&self.query)
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| request_error(&e, operation, limit))?;
        check_status(response, operation)?;
        Ok(())
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<Value, TransportError> {
        let endpoint = self.endpoint.as_ref().ok_or(TransportError::NotConnected)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let exchange = async {
            self.post(endpoint, &JsonRpcRequest::new(id, method, params), method, limit)
                .await?;
            rx.await.map_err(|_| {
                TransportError::Connection("event stream closed before response".to_string())
            })
        };

        let outcome = timeout(limit, exchange).await;
        lock(&self.pending).remove(&id);
        let response = outcome.map_err(|_| TransportError::timeout(method, limit))??;
        response.into_result(method)
    }

    async fn handshake(&self) -> Result<(), TransportError> {
        let limit = self.timeouts.connect;
        self.request("initialize", Some(protocol::initialize_params()), limit)
            .await?;
        let endpoint = self.endpoint.as_ref().ok_or(TransportError::NotConnected)?;
        let notification = JsonRpcNotification::new("notifications/initialized");
        timeout(
            limit,
            self.post(endpoint, &notification, "notifications/initialized", limit),
        )
        .await
        .map_err(|_| TransportError::timeout("notifications/initialized", limit))?
    }
}

/// Background reader: decodes the stream and routes responses.
///
/// Dropping the pending senders when the stream ends wakes every waiting
/// request with a connection error.
async fn read_events(
    response: reqwest::Response,
    server_id: String,
    pending: PendingMap,
    endpoint_tx: oneshot::Sender<String>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(server_id = %server_id, error = %e, "Event stream failed");
                break;
            }
        };

        for event in decoder.push(&chunk) {
            match event.event.as_str() {
                "endpoint" => {
                    if let Some(tx) = endpoint_tx.take() {
                        let _ = tx.send(event.data);
                    }
                }
                "message" => route(&pending, &server_id, &event.data),
                other => {
                    tracing::debug!(server_id = %server_id, event = other, "Ignoring event");
                }
            }
        }
    }

    tracing::debug!(server_id = %server_id, "Event stream closed");
    lock(&pending).clear();
}

fn route(pending: &PendingMap, server_id: &str, data: &str) {
    let Ok(response) = serde_json::from_str::<JsonRpcResponse>(data) else {
        tracing::debug!(server_id, data, "Skipping non-JSON-RPC message");
        return;
    };
    let Some(id) = response.numeric_id() else {
        // Server notification.
        return;
    };
    if let Some(tx) = lock(pending).remove(&id) {
        let _ = tx.send(response);
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let limit = self.timeouts.connect;
        let endpoint = match timeout(limit, self.open_stream()).await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                self.disconnect().await;
                return Err(e);
            }
            Err(_) => {
                self.disconnect().await;
                return Err(TransportError::timeout("endpoint event", limit));
            }
        };
        self.endpoint = Some(endpoint);

        if let Err(e) = self.handshake().await {
            self.disconnect().await;
            return Err(e);
        }

        tracing::debug!(server_id = %self.server_id, "Connected to SSE tool server");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.endpoint = None;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        lock(&self.pending).clear();
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, TransportError> {
        let result = self
            .request("tools/list", None, self.timeouts.request)
            .await?;
        protocol::parse_tool_list(result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let params = protocol::tool_call_params(name, arguments);
        let result = self
            .request("tools/call", Some(params), self.timeouts.request)
            .await?;
        protocol::parse_tool_call(result)
    }

    fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> SseTransport {
        let config = ServerConfig::sse("s", "SSE", "https://example.com/mcp/sse");
        SseTransport::new(
            &config,
            &InjectedAuth::default(),
            reqwest::Client::new(),
            TransportTimeouts::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_route_delivers_to_pending_request() {
        let transport = transport();
        let (tx, mut rx) = oneshot::channel();
        lock(&transport.pending).insert(5, tx);

        route(
            &transport.pending,
            "s",
            r#"{"jsonrpc":"2.0","id":5,"result":{"ok":true}}"#,
        );

        let response = rx.try_recv().unwrap();
        assert!(response.answers(5));
        assert!(lock(&transport.pending).is_empty());
    }

    #[test]
    fn test_route_ignores_notifications_and_unknown_ids() {
        let transport = transport();
        let (tx, mut rx) = oneshot::channel();
        lock(&transport.pending).insert(1, tx);

        route(&transport.pending, "s", r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#);
        route(&transport.pending, "s", r#"{"jsonrpc":"2.0","id":9,"result":{}}"#);

        assert!(rx.try_recv().is_err());
        assert_eq!(lock(&transport.pending).len(), 1);
    }

    #[test]
    fn test_endpoint_resolves_relative_to_server_url() {
        let transport = transport();
        let endpoint = transport.url.join("/mcp/messages?session=abc").unwrap();
        assert_eq!(
            endpoint.as_str(),
            "https://example.com/mcp/messages?session=abc"
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut transport = transport();
        transport.disconnect().await;
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }
}

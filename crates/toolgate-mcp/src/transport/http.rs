//! Streaming-HTTP transport.
//!
//! Every message is a `POST` to the server URL. The server answers either
//! with a plain JSON body or with an event stream carrying the response, and
//! may assign a session id on `initialize` that later requests echo back.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tokio::time::timeout;
use toolgate_core::{InjectedAuth, ServerConfig, ToolInfo, ToolResult, TransportKind};
use url::Url;

use super::event_stream::SseDecoder;
use super::{Transport, TransportError, TransportTimeouts};
use crate::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

const SESSION_HEADER: &str = "mcp-session-id";

/// Parse and check the server URL of an HTTP-based server.
pub(super) fn server_url(config: &ServerConfig) -> Result<Url, TransportError> {
    let raw = config.connection.url().ok_or_else(|| {
        TransportError::Connection(format!("server '{}' has no URL", config.id))
    })?;
    Url::parse(raw).map_err(|e| {
        TransportError::Connection(format!("invalid URL for server '{}': {e}", config.id))
    })
}

/// Convert injected headers into a header map.
pub(super) fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::Connection(format!("invalid header name '{name}': {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::Connection(format!("invalid value for header '{name}'")))?;
        value.set_sensitive(true);
        map.insert(name, value);
    }
    Ok(map)
}

/// Classify a client error into a transport error.
pub(super) fn request_error(err: &reqwest::Error, operation: &str, limit: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::timeout(operation, limit)
    } else {
        TransportError::Connection(format!("{operation}: {err}"))
    }
}

/// Reject non-success statuses.
pub(super) fn check_status(
    response: reqwest::Response,
    operation: &str,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        Err(TransportError::Connection(format!(
            "{operation}: server rejected credentials ({status})"
        )))
    } else {
        Err(TransportError::Connection(format!(
            "{operation}: server returned {status}"
        )))
    }
}

/// Transport for servers speaking MCP over streaming HTTP.
pub struct StreamableHttpTransport {
    server_id: String,
    url: Url,
    headers: HeaderMap,
    client: reqwest::Client,
    timeouts: TransportTimeouts,
    session_id: Option<String>,
    connected: bool,
    next_id: AtomicU64,
}

impl StreamableHttpTransport {
    /// Build an unconnected transport.
    ///
    /// Injected query parameters are folded into the URL so every request carries them.
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
        let mut url = server_url(config)?;
        if !auth.query.is_empty() {
            url.query_pairs_mut().extend_pairs(auth.query.iter());
        }

        Ok(Self {
            server_id: config.id.clone(),
            url,
            headers: header_map(&auth.headers)?,
            client,
            timeouts,
            session_id: None,
            connected: false,
            next_id: AtomicU64::new(1),
        })
    }

    async fn post(&self, body: &Value, operation: &str, limit: Duration) -> Result<reqwest::Response, TransportError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| request_error(&e, operation, limit))?;
        check_status(response, operation)
    }

    /// One request/response exchange. Returns the result and any session id
    /// the server assigned.
    async fn exchange(
        &self,
        method: &str,
        params: Option<Value>,
        limit: Duration,
    ) -> Result<(Value, Option<String>), TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_value(JsonRpcRequest::new(id, method, params))
            .map_err(|e| TransportError::Protocol(format!("failed to encode request: {e}")))?;

        let exchange = async {
            let response = self.post(&body, method, limit).await?;
            let session = response
                .headers()
                .get(SESSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let reply = read_reply(response, id, method, limit).await?;
            Ok::<_, TransportError>((reply, session))
        };

        let (reply, session) = timeout(limit, exchange)
            .await
            .map_err(|_| TransportError::timeout(method, limit))??;
        Ok((reply.into_result(method)?, session))
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        let (result, _) = self.exchange(method, params, self.timeouts.request).await?;
        Ok(result)
    }
}

/// Read the response to request `id` from a JSON or event-stream body.
async fn read_reply(
    response: reqwest::Response,
    id: u64,
    method: &str,
    limit: Duration,
) -> Result<JsonRpcResponse, TransportError> {
    let is_stream = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));

    if !is_stream {
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(&e, method, limit))?;
        return serde_json::from_slice(&body)
            .map_err(|e| TransportError::Protocol(format!("{method}: invalid JSON response: {e}")));
    }

    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| request_error(&e, method, limit))?;
        for event in decoder.push(&chunk) {
            if let Some(reply) = match_event(&event.data, id) {
                return Ok(reply);
            }
        }
    }
    if let Some(reply) = decoder.finish().and_then(|event| match_event(&event.data, id)) {
        return Ok(reply);
    }

    Err(TransportError::Protocol(format!(
        "{method}: event stream ended without a response"
    )))
}

fn match_event(data: &str, id: u64) -> Option<JsonRpcResponse> {
    serde_json::from_str::<JsonRpcResponse>(data)
        .ok()
        .filter(|response| response.answers(id))
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connected {
            return Ok(());
        }

        let (_, session) = self
            .exchange(
                "initialize",
                Some(protocol::initialize_params()),
                self.timeouts.connect,
            )
            .await?;
        self.session_id = session;

        let notification = serde_json::to_value(JsonRpcNotification::new("notifications/initialized"))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        let limit = self.timeouts.connect;
        timeout(limit, self.post(&notification, "notifications/initialized", limit))
            .await
            .map_err(|_| TransportError::timeout("notifications/initialized", limit))??;

        self.connected = true;
        tracing::debug!(
            server_id = %self.server_id,
            has_session = self.session_id.is_some(),
            "Connected to streaming-HTTP tool server"
        );
        Ok(())
    }

    /// Forget the session and ask the server to end it.
    ///
    /// The `DELETE` is best-effort: servers without session termination
    /// answer 405, and failures are only logged.
    async fn disconnect(&mut self) {
        self.connected = false;
        let Some(session) = self.session_id.take() else {
            return;
        };

        let limit = self.timeouts.connect;
        let request = self
            .client
            .delete(self.url.clone())
            .headers(self.headers.clone())
            .header(SESSION_HEADER, &session)
            .send();

        match timeout(limit, request).await {
            Ok(Ok(response)) => tracing::debug!(
                server_id = %self.server_id,
                status = %response.status(),
                "Session termination sent"
            ),
            Ok(Err(e)) => tracing::debug!(
                server_id = %self.server_id,
                error = %e,
                "Session termination failed"
            ),
            Err(_) => tracing::debug!(server_id = %self.server_id, "Session termination timed out"),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, TransportError> {
        let result = self.request("tools/list", None).await?;
        protocol::parse_tool_list(result)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError> {
        let result = self
            .request("tools/call", Some(protocol::tool_call_params(name, arguments)))
            .await?;
        protocol::parse_tool_call(result)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

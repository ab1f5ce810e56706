//! Transports: one connection type per way of reaching a tool server.
//!
//! Every transport speaks the same MCP JSON-RPC protocol and exposes the
//! same [`Transport`] interface, so the gateway selects one at construction
//! and never branches on the kind again.

mod event_stream;
mod http;
mod sse;
mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use toolgate_core::{EngineSettings, InjectedAuth, ServerConfig, ToolInfo, ToolResult, TransportKind};

pub use event_stream::{SseDecoder, SseEvent};
pub use http::StreamableHttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Errors raised by a transport.
///
/// Each variant is a failure class the gateway maps without inspecting the
/// transport kind.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server could not be started or reached, or dropped the connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An operation exceeded its budget.
    #[error("Timed out after {}s waiting for {operation}", after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// The tool server answered with an application-level error.
    #[error("Tool error: {0}")]
    Tool(String),

    /// An operation was attempted before `connect` or after `disconnect`.
    #[error("Transport not connected")]
    NotConnected,

    /// The server sent something that is not valid MCP.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Coarse failure class of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCategory {
    Connection,
    Timeout,
    Tool,
    Protocol,
}

impl TransportError {
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    pub const fn category(&self) -> TransportErrorCategory {
        match self {
            Self::Connection(_) | Self::NotConnected => TransportErrorCategory::Connection,
            Self::Timeout { .. } => TransportErrorCategory::Timeout,
            Self::Tool(_) => TransportErrorCategory::Tool,
            Self::Protocol(_) => TransportErrorCategory::Protocol,
        }
    }
}

/// Per-operation time budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// Spawn or open plus the `initialize` handshake.
    pub connect: Duration,
    /// Each request after the handshake.
    pub request: Duration,
    /// Terminate-to-kill grace for local processes.
    pub shutdown_grace: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self::from_settings(&EngineSettings::default())
    }
}

impl TransportTimeouts {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            connect: settings.connect_timeout(),
            request: settings.tool_call_timeout(),
            shutdown_grace: settings.shutdown_grace(),
        }
    }
}

/// A connection to one tool server.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Open the connection and complete the `initialize` handshake.
    ///
    /// Connecting an already connected transport is a no-op.
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Tear the connection down. Idempotent and best-effort: never fails.
    async fn disconnect(&mut self);

    async fn list_tools(&self) -> Result<Vec<ToolInfo>, TransportError>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, TransportError>;

    fn is_connected(&self) -> bool;
}

/// Builds the transport for a server. Chosen once per connection.
pub trait TransportFactory: Send + Sync {
    /// Construct an unconnected transport for `config` carrying `auth`.
    fn create(
        &self,
        config: &ServerConfig,
        auth: &InjectedAuth,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Factory for the real transports, sharing one HTTP client.
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
    client: reqwest::Client,
    timeouts: TransportTimeouts,
}

impl DefaultTransportFactory {
    pub fn new(timeouts: TransportTimeouts) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeouts,
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub const fn timeouts(&self) -> TransportTimeouts {
        self.timeouts
    }
}

impl Default for DefaultTransportFactory {
    fn default() -> Self {
        Self::new(TransportTimeouts::default())
    }
}

impl TransportFactory for DefaultTransportFactory {
    fn create(
        &self,
        config: &ServerConfig,
        auth: &InjectedAuth,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let transport: Box<dyn Transport> = match config.kind() {
            TransportKind::Stdio => Box::new(StdioTransport::new(config, auth, self.timeouts)?),
            TransportKind::StreamableHttp => Box::new(StreamableHttpTransport::new(
                config,
                auth,
                self.client.clone(),
                self.timeouts,
            )?),
            TransportKind::Sse => Box::new(SseTransport::new(
                config,
                auth,
                self.client.clone(),
                self.timeouts,
            )?),
        };
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            TransportError::NotConnected.category(),
            TransportErrorCategory::Connection
        );
        assert_eq!(
            TransportError::timeout("tools/call", Duration::from_secs(30)).category(),
            TransportErrorCategory::Timeout
        );
        assert_eq!(
            TransportError::Tool("boom".into()).category(),
            TransportErrorCategory::Tool
        );
    }

    #[test]
    fn test_timeout_message_names_operation() {
        let err = TransportError::timeout("initialize", Duration::from_secs(5));
        assert_eq!(err.to_string(), "Timed out after 5s waiting for initialize");
    }

    #[test]
    fn test_factory_selects_transport_by_kind() {
        let factory = DefaultTransportFactory::default();
        let auth = InjectedAuth::default();

        let stdio = ServerConfig::stdio("fs", "Filesystem", "npx", vec!["-y".into()]);
        assert_eq!(
            factory.create(&stdio, &auth).unwrap().kind(),
            TransportKind::Stdio
        );

        let http = ServerConfig::streamable_http("gh", "GitHub", "https://example.com/mcp");
        assert_eq!(
            factory.create(&http, &auth).unwrap().kind(),
            TransportKind::StreamableHttp
        );

        let sse = ServerConfig::sse("s", "SSE", "https://example.com/sse");
        let transport = factory.create(&sse, &auth).unwrap();
        assert_eq!(transport.kind(), TransportKind::Sse);
        assert!(!transport.is_connected());
    }
}

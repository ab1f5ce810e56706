//! Scoped access to tool servers.
//!
//! The gateway resolves a server, injects the caller's credential, opens the
//! matching transport, discovers tools, hands a [`Connection`] to a caller
//! supplied scope, and tears the transport down when the scope ends, whether
//! it returned `Ok`, returned `Err`, or panicked.

use std::panic::AssertUnwindSafe;
use std::pin::{Pin, pin};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use toolgate_core::{Credential, ServerConfig, ToolInfo, ToolResult, TransportKind};

use crate::injector::{CredentialInjectionError, CredentialInjector};
use crate::registry::ServerRegistry;
use crate::transport::{
    DefaultTransportFactory, Transport, TransportError, TransportErrorCategory, TransportFactory,
};

/// Errors surfaced by the gateway. Every variant names the server involved.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server is unknown or disabled.
    #[error("Tool server '{0}' not found")]
    ServerNotFound(String),

    #[error("Credential error for server '{server_id}': {source}")]
    CredentialInjection {
        server_id: String,
        #[source]
        source: CredentialInjectionError,
    },

    /// The server could not be started, reached, or initialized.
    #[error("Failed to connect to '{server_id}': {message}")]
    Connection { server_id: String, message: String },

    /// An operation against the server exceeded its budget.
    #[error("Server '{server_id}' timed out: {message}")]
    Timeout { server_id: String, message: String },

    /// The tool itself reported a failure.
    #[error("Tool '{tool}' on '{server_id}' failed: {message}")]
    Tool {
        server_id: String,
        tool: String,
        message: String,
    },
}

impl GatewayError {
    /// Map a failure while connecting or discovering tools.
    ///
    /// Timeouts keep their own class; everything else is a connection failure.
    fn connect(server_id: &str, err: TransportError) -> Self {
        match err.category() {
            TransportErrorCategory::Timeout => Self::Timeout {
                server_id: server_id.to_string(),
                message: err.to_string(),
            },
            _ => Self::Connection {
                server_id: server_id.to_string(),
                message: err.to_string(),
            },
        }
    }

    /// Map a failure during a tool call.
    fn call(server_id: &str, tool: &str, err: TransportError) -> Self {
        match err.category() {
            TransportErrorCategory::Timeout => Self::Timeout {
                server_id: server_id.to_string(),
                message: err.to_string(),
            },
            TransportErrorCategory::Connection => Self::Connection {
                server_id: server_id.to_string(),
                message: err.to_string(),
            },
            TransportErrorCategory::Tool | TransportErrorCategory::Protocol => Self::Tool {
                server_id: server_id.to_string(),
                tool: tool.to_string(),
                message: match err {
                    TransportError::Tool(message) => message,
                    other => other.to_string(),
                },
            },
        }
    }

    /// Whether the tool itself failed, as opposed to the infrastructure.
    pub const fn is_tool_error(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }

    pub fn server_id(&self) -> &str {
        match self {
            Self::ServerNotFound(server_id)
            | Self::CredentialInjection { server_id, .. }
            | Self::Connection { server_id, .. }
            | Self::Timeout { server_id, .. }
            | Self::Tool { server_id, .. } => server_id,
        }
    }
}

/// An open, initialized connection to one tool server.
///
/// Only ever lent to a scope by [`Gateway::connection`]; never shared across
/// concurrent callers.
pub struct Connection {
    server_id: String,
    tools: Vec<ToolInfo>,
    transport: Box<dyn Transport>,
}

impl Connection {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Tools discovered at connect time. Fixed for the connection's lifetime.
    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Invoke a tool on this server.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Tool` when the tool reports a failure, and
    /// `Connection`/`Timeout` for infrastructure failures.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolResult, GatewayError> {
        tracing::debug!(server_id = %self.server_id, tool = name, "Calling tool");
        self.transport
            .call_tool(name, arguments)
            .await
            .map_err(|e| GatewayError::call(&self.server_id, name, e))
    }

    async fn close(&mut self) {
        self.transport.disconnect().await;
        tracing::debug!(server_id = %self.server_id, "Tool server disconnected");
    }
}

/// Orchestrates registry lookup, credential injection, and transport lifetime.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<ServerRegistry>,
    injector: Arc<CredentialInjector>,
    factory: Arc<dyn TransportFactory>,
}

impl Gateway {
    /// Gateway over `registry` with the built-in injector and real transports.
    pub fn new(registry: Arc<ServerRegistry>) -> Self {
        Self {
            registry,
            injector: Arc::new(CredentialInjector::new()),
            factory: Arc::new(DefaultTransportFactory::default()),
        }
    }

    #[must_use]
    pub fn with_injector(mut self, injector: CredentialInjector) -> Self {
        self.injector = Arc::new(injector);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn injector(&self) -> &CredentialInjector {
        &self.injector
    }

    pub fn list_servers(&self) -> Vec<ServerConfig> {
        self.registry.list_enabled()
    }

    pub fn get_server(&self, server_id: &str) -> Option<ServerConfig> {
        self.registry.get(server_id)
    }

    pub fn servers_available_to_user<S: AsRef<str>>(&self, credential_types: &[S]) -> Vec<ServerConfig> {
        self.registry.list_available(credential_types)
    }

    pub fn list_servers_by_credential_type(&self, credential_type: &str) -> Vec<ServerConfig> {
        self.registry.list_by_credential_type(credential_type)
    }

    /// Run `scope` with an open connection to `server_id`.
    ///
    /// The transport is disconnected exactly once after the scope finishes,
    /// including when it fails or panics (the panic resumes after cleanup).
    ///
    /// # Errors
    ///
    /// Resolution, injection, and connect failures are returned as
    /// `GatewayError` converted into `E`; otherwise the scope's own result.
    pub async fn connection<T, E, F>(
        &self,
        server_id: &str,
        credential: Option<&Credential>,
        scope: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c Connection) -> BoxFuture<'c, Result<T, E>>,
        E: From<GatewayError>,
    {
        self.connection_until(server_id, credential, std::future::pending(), scope)
            .await
    }

    /// Like [`Gateway::connection`], but abandons connecting or the scope as
    /// soon as `interrupt` resolves.
    ///
    /// An interrupted scope is dropped and the transport is still
    /// disconnected before this returns, so local processes get the graceful
    /// terminate-then-kill shutdown rather than a bare kill.
    ///
    /// # Errors
    ///
    /// The error `interrupt` resolved to, or as for [`Gateway::connection`].
    pub async fn connection_until<T, E, F, I>(
        &self,
        server_id: &str,
        credential: Option<&Credential>,
        interrupt: I,
        scope: F,
    ) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c Connection) -> BoxFuture<'c, Result<T, E>>,
        E: From<GatewayError>,
        I: Future<Output = E>,
    {
        let mut interrupt = pin!(interrupt);
        let mut connection = self.open(server_id, credential, interrupt.as_mut()).await?;

        let outcome = tokio::select! {
            biased;
            err = interrupt.as_mut() => {
                tracing::debug!(server_id, "Connection scope interrupted");
                Ok(Err(err))
            }
            outcome = AssertUnwindSafe(scope(&connection)).catch_unwind() => outcome,
        };
        connection.close().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Invoke a tool on an open connection.
    ///
    /// # Errors
    ///
    /// See [`Connection::call_tool`].
    pub async fn call_tool(
        &self,
        connection: &Connection,
        name: &str,
        arguments: Value,
    ) -> Result<ToolResult, GatewayError> {
        connection.call_tool(name, arguments).await
    }

    /// Discover a server's tools with the user's credential.
    ///
    /// Returns an empty list when the server is unknown, the credential is
    /// unusable, or the server is unreachable.
    pub async fn server_tools_for_user(
        &self,
        server_id: &str,
        credential: Option<&Credential>,
    ) -> Vec<ToolInfo> {
        let result = self
            .connection(server_id, credential, |conn| {
                async move { Ok::<_, GatewayError>(conn.tools().to_vec()) }.boxed()
            })
            .await;

        result.unwrap_or_else(|e| {
            tracing::warn!(server_id, error = %e, "Could not list tools for user");
            Vec::new()
        })
    }

    async fn open<E, I>(
        &self,
        server_id: &str,
        credential: Option<&Credential>,
        interrupt: Pin<&mut I>,
    ) -> Result<Connection, E>
    where
        E: From<GatewayError>,
        I: Future<Output = E>,
    {
        let config = self
            .registry
            .get(server_id)
            .ok_or_else(|| GatewayError::ServerNotFound(server_id.to_string()))?;

        let auth = self.injector.prepare(&config, credential).map_err(|source| {
            GatewayError::CredentialInjection {
                server_id: server_id.to_string(),
                source,
            }
        })?;

        let mut transport = self
            .factory
            .create(&config, &auth)
            .map_err(|e| GatewayError::connect(server_id, e))?;

        let discovered = tokio::select! {
            biased;
            err = interrupt => Err(err),
            discovered = async {
                match transport.connect().await {
                    Ok(()) => transport.list_tools().await,
                    Err(e) => Err(e),
                }
            } => discovered.map_err(|e| {
                tracing::warn!(server_id, error = %e, "Tool server connection failed");
                E::from(GatewayError::connect(server_id, e))
            }),
        };
        let tools = match discovered {
            Ok(tools) => tools,
            Err(err) => {
                transport.disconnect().await;
                return Err(err);
            }
        };

        tracing::info!(
            server_id,
            transport = %transport.kind(),
            tool_count = tools.len(),
            "Tool server connected"
        );

        Ok(Connection {
            server_id: server_id.to_string(),
            tools,
            transport,
        })
    }
}

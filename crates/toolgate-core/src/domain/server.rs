//! Tool server domain types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How the gateway reaches a tool server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Local child process speaking line-delimited JSON-RPC over stdin/stdout
    Stdio,
    /// Remote server accepting JSON-RPC over HTTP POST (JSON or SSE replies)
    StreamableHttp,
    /// Remote server pushing JSON-RPC replies over a server-sent event stream
    Sse,
}

impl TransportKind {
    /// Wire name of the transport kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::StreamableHttp => "streamable_http",
            Self::Sse => "sse",
        }
    }

    /// Parse a transport kind from its wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdio" => Some(Self::Stdio),
            "streamable_http" => Some(Self::StreamableHttp),
            "sse" => Some(Self::Sse),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection parameters, one shape per transport kind.
///
/// Serialized with a `transport` tag so a catalog file reads as
/// `{"id": "fs", "transport": "stdio", "command": "npx", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ConnectionParams {
    Stdio {
        /// Executable name or path (e.g. "npx").
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment for the child, applied over the parent environment.
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
    StreamableHttp {
        url: String,
    },
    Sse {
        url: String,
    },
}

impl ConnectionParams {
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio { .. } => TransportKind::Stdio,
            Self::StreamableHttp { .. } => TransportKind::StreamableHttp,
            Self::Sse { .. } => TransportKind::Sse,
        }
    }

    /// URL for HTTP-based transports.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::StreamableHttp { url } | Self::Sse { url } => Some(url),
            Self::Stdio { .. } => None,
        }
    }
}

const fn default_enabled() -> bool {
    true
}

/// Static description of one tool server.
///
/// Immutable once loaded into the registry; identified by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique identifier (e.g. "slack").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Transport kind plus its connection parameters.
    #[serde(flatten)]
    pub connection: ConnectionParams,

    /// Credential type this server needs, or `None` when it needs none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,

    /// Tool names the server advertises (documentation only; discovery is authoritative).
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ServerConfig {
    fn new(id: impl Into<String>, name: impl Into<String>, connection: ConnectionParams) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            connection,
            credential_type: None,
            tools: Vec::new(),
            enabled: true,
        }
    }

    /// Create a local-process server configuration.
    #[must_use]
    pub fn stdio(
        id: impl Into<String>,
        name: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self::new(
            id,
            name,
            ConnectionParams::Stdio {
                command: command.into(),
                args,
                env: BTreeMap::new(),
                working_dir: None,
            },
        )
    }

    /// Create a streaming-HTTP server configuration.
    #[must_use]
    pub fn streamable_http(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self::new(id, name, ConnectionParams::StreamableHttp { url: url.into() })
    }

    /// Create an SSE server configuration.
    #[must_use]
    pub fn sse(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, name, ConnectionParams::Sse { url: url.into() })
    }

    #[must_use]
    pub fn with_credential_type(mut self, credential_type: impl Into<String>) -> Self {
        self.credential_type = Some(credential_type.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable for a local-process server. No-op for other kinds.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let ConnectionParams::Stdio { env, .. } = &mut self.connection {
            env.insert(key.into(), value.into());
        }
        self
    }

    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.connection.kind()
    }

    /// Whether a user holding `credential_types` may use this server.
    pub fn is_available_with<S: AsRef<str>>(&self, credential_types: &[S]) -> bool {
        self.credential_type
            .as_deref()
            .is_none_or(|required| credential_types.iter().any(|t| t.as_ref() == required))
    }

    /// Validate the connection parameters for the transport kind.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Server id cannot be empty".to_string());
        }

        match &self.connection {
            ConnectionParams::Stdio {
                command,
                working_dir,
                ..
            } => {
                if command.trim().is_empty() {
                    return Err(format!("Stdio server '{}' command cannot be empty", self.id));
                }
                if command.contains(char::is_whitespace) {
                    return Err(format!(
                        "Stdio server '{}' command must be an executable only; put flags in args",
                        self.id
                    ));
                }
                if let Some(cwd) = working_dir {
                    if !cwd.is_empty() && !std::path::Path::new(cwd).is_absolute() {
                        return Err(format!(
                            "Stdio server '{}' working_dir must be absolute: {cwd}",
                            self.id
                        ));
                    }
                }
                Ok(())
            }
            ConnectionParams::StreamableHttp { url } | ConnectionParams::Sse { url } => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(format!(
                        "{} server '{}' requires an http(s) url, got '{url}'",
                        self.kind(),
                        self.id
                    ));
                }
                Ok(())
            }
        }
    }
}

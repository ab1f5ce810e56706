//! In-memory catalog of known tool servers.
//!
//! Reads dominate; registration and enable/disable are rare administrative
//! writes, so a plain `RwLock` is enough.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Deserialize;
use thiserror::Error;
use toolgate_core::{ServerConfig, TransportKind};

/// Errors raised while loading or registering servers.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read server catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid server catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid server '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("Duplicate server id '{0}'")]
    Duplicate(String),
}

/// A catalog file is either a bare array or `{"servers": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<ServerConfig>),
    Wrapped { servers: Vec<ServerConfig> },
}

/// Catalog of tool servers keyed by id.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, ServerConfig>>,
}

impl ServerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the built-in servers.
    pub fn with_defaults() -> Self {
        let servers = default_servers()
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        Self {
            servers: RwLock::new(servers),
        }
    }

    /// Build a registry from explicit configurations.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or a duplicate id.
    pub fn from_configs(configs: Vec<ServerConfig>) -> Result<Self, RegistryError> {
        Ok(Self {
            servers: RwLock::new(index(configs)?),
        })
    }

    /// Load a registry from a JSON catalog file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or holds invalid entries.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let configs = match serde_json::from_str::<CatalogFile>(&raw)? {
            CatalogFile::List(servers) | CatalogFile::Wrapped { servers } => servers,
        };
        tracing::debug!(path = %path.display(), count = configs.len(), "Loaded server catalog");
        Self::from_configs(configs)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ServerConfig>> {
        self.servers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ServerConfig>> {
        self.servers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up an enabled server. Disabled servers look absent.
    pub fn get(&self, id: &str) -> Option<ServerConfig> {
        self.read().get(id).filter(|s| s.enabled).cloned()
    }

    fn collect(&self, filter: impl Fn(&ServerConfig) -> bool) -> Vec<ServerConfig> {
        let mut servers: Vec<ServerConfig> =
            self.read().values().filter(|s| filter(s)).cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        servers
    }

    /// Every server, disabled ones included, sorted by id.
    pub fn list_all(&self) -> Vec<ServerConfig> {
        self.collect(|_| true)
    }

    pub fn list_enabled(&self) -> Vec<ServerConfig> {
        self.collect(|s| s.enabled)
    }

    /// Enabled servers usable with the given credential types: those needing
    /// no credential plus those whose credential type is in the set.
    pub fn list_available<S: AsRef<str>>(&self, credential_types: &[S]) -> Vec<ServerConfig> {
        self.collect(|s| s.enabled && s.is_available_with(credential_types))
    }

    pub fn list_by_transport(&self, kind: TransportKind) -> Vec<ServerConfig> {
        self.collect(|s| s.enabled && s.kind() == kind)
    }

    pub fn list_by_credential_type(&self, credential_type: &str) -> Vec<ServerConfig> {
        self.collect(|s| s.enabled && s.credential_type.as_deref() == Some(credential_type))
    }

    /// Add or replace a server.
    ///
    /// # Errors
    ///
    /// Fails if the configuration does not validate.
    pub fn register(&self, config: ServerConfig) -> Result<(), RegistryError> {
        validate(&config)?;
        let id = config.id.clone();
        if self.write().insert(id.clone(), config).is_some() {
            tracing::info!(server_id = %id, "Replaced tool server");
        } else {
            tracing::info!(server_id = %id, "Registered tool server");
        }
        Ok(())
    }

    /// Remove a server. Returns whether it existed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            tracing::info!(server_id = %id, "Unregistered tool server");
        }
        removed
    }

    /// Enable a server. Returns whether it exists.
    pub fn enable(&self, id: &str) -> bool {
        self.set_enabled(id, true)
    }

    /// Disable a server. Returns whether it exists.
    pub fn disable(&self, id: &str) -> bool {
        self.set_enabled(id, false)
    }

    fn set_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut servers = self.write();
        let Some(server) = servers.get_mut(id) else {
            return false;
        };
        server.enabled = enabled;
        tracing::info!(server_id = %id, enabled, "Updated tool server");
        true
    }

    /// Replace the whole catalog.
    ///
    /// The catalog is left untouched when any configuration is invalid.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration or a duplicate id.
    pub fn reload(&self, configs: Vec<ServerConfig>) -> Result<(), RegistryError> {
        let servers = index(configs)?;
        let count = servers.len();
        *self.write() = servers;
        tracing::info!(count, "Reloaded server catalog");
        Ok(())
    }
}

fn validate(config: &ServerConfig) -> Result<(), RegistryError> {
    config.validate().map_err(|reason| RegistryError::Invalid {
        id: config.id.clone(),
        reason,
    })
}

fn index(configs: Vec<ServerConfig>) -> Result<HashMap<String, ServerConfig>, RegistryError> {
    let mut servers = HashMap::with_capacity(configs.len());
    for config in configs {
        validate(&config)?;
        if servers.contains_key(&config.id) {
            return Err(RegistryError::Duplicate(config.id));
        }
        servers.insert(config.id.clone(), config);
    }
    Ok(servers)
}

fn npx(package: &str) -> Vec<String> {
    vec!["-y".to_string(), package.to_string()]
}

/// The built-in server catalog.
pub fn default_servers() -> Vec<ServerConfig> {
    vec![
        ServerConfig::streamable_http("slack", "Slack MCP", "https://mcp.slack.com/v1")
            .with_description("Slack messaging and workspace integration")
            .with_credential_type("slack_oauth")
            .with_tools([
                "send_message",
                "list_channels",
                "search_messages",
                "get_channel_info",
                "list_users",
            ]),
        ServerConfig::streamable_http("github", "GitHub MCP", "https://gitmcp.io/api")
            .with_description("GitHub repository and issue management")
            .with_credential_type("github_token")
            .with_tools([
                "search_repos",
                "create_issue",
                "list_issues",
                "create_pr",
                "list_prs",
                "get_file_contents",
            ]),
        ServerConfig::stdio(
            "filesystem",
            "Filesystem MCP",
            "npx",
            npx("@anthropic/mcp-filesystem"),
        )
        .with_description("Local filesystem operations")
        .with_tools([
            "read_file",
            "write_file",
            "list_directory",
            "create_directory",
            "delete_file",
        ]),
        ServerConfig::streamable_http(
            "google_drive",
            "Google Drive MCP",
            "https://mcp.googleapis.com/drive/v1",
        )
        .with_description("Google Drive file management")
        .with_credential_type("google_oauth")
        .with_tools([
            "list_files",
            "get_file",
            "create_file",
            "update_file",
            "delete_file",
            "share_file",
        ])
        .disabled(),
        ServerConfig::stdio(
            "notion",
            "Notion MCP",
            "npx",
            npx("@notionhq/notion-mcp-server"),
        )
        .with_description("Notion workspace management via the official server")
        .with_credential_type("notion_oauth")
        .with_tools([
            "v1/search",
            "v1/pages",
            "v1/pages/[page_id]",
            "v1/blocks/[block_id]/children",
            "v1/comments",
            "v1/databases/[database_id]/query",
        ]),
    ]
}

//! Node catalog port.
//!
//! The catalog resolves a node type name to its definition and to the
//! implementation the tool bridge should dispatch to.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::domain::{Credential, NodeDefinition};
use crate::error::NodeError;

/// Per-call context handed to a node implementation.
#[derive(Clone, Default)]
pub struct NodeContext {
    pub execution_id: String,
    pub trace_id: String,
    /// Decrypted credentials for this execution, keyed by credential type.
    pub credentials: HashMap<String, Credential>,
    pub variables: Map<String, Value>,
}

impl NodeContext {
    pub fn new(execution_id: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            trace_id: trace_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: HashMap<String, Credential>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn credential(&self, credential_type: &str) -> Option<&Credential> {
        self.credentials.get(credential_type)
    }
}

impl fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeContext")
            .field("execution_id", &self.execution_id)
            .field("trace_id", &self.trace_id)
            .field("credentials", &self.credentials.keys().collect::<Vec<_>>())
            .field("variables", &self.variables)
            .finish()
    }
}

/// A node implemented in-process.
#[async_trait]
pub trait LocalNode: Send + Sync {
    /// Run the node on already-validated input.
    ///
    /// # Errors
    ///
    /// Returns `NodeError` when the input is unusable or the node fails.
    async fn execute(&self, input: Map<String, Value>, ctx: &NodeContext)
    -> Result<Value, NodeError>;
}

/// How a node type is executed.
#[derive(Clone)]
pub enum NodeBinding {
    /// In-process implementation.
    Local(Arc<dyn LocalNode>),
    /// A tool on the server named by `NodeDefinition::mcp_server_id`.
    Mcp { tool: String },
}

impl fmt::Debug for NodeBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local(..)"),
            Self::Mcp { tool } => f.debug_struct("Mcp").field("tool", tool).finish(),
        }
    }
}

/// A resolved catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: NodeDefinition,
    pub binding: NodeBinding,
}

/// Port for resolving node types.
pub trait NodeCatalog: Send + Sync {
    /// Look up a node type by name.
    fn get(&self, node_type: &str) -> Option<CatalogEntry>;

    /// All registered definitions.
    fn list(&self) -> Vec<NodeDefinition>;
}

//! Core domain types and port definitions for toolgate.
//!
//! This crate holds the data model shared by the gateway and the agent loop,
//! the error taxonomy callers branch on, and the traits that external
//! collaborators (model provider, node catalog, credential store, event sink)
//! implement. It performs no I/O.
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    ChatMessage, ConnectionParams, Credential, ExecutionEvent, ExecutionEventType,
    ExecutionState, ExecutionStatus, GraphEdge, InjectedAuth, MessageRole, NodeCategory,
    NodeDefinition, NodeInput, NodeInputType, NodeInstance, NodeOutput, Position, ServerConfig,
    ToolCallRequest, ToolInfo, ToolResult, TransportKind, Workflow, WorkflowGraph,
};
pub use error::{
    ExecutionError, ExecutionErrorCode, NodeError, NodeErrorCode, NodeExecutionError,
    NodeValidationError,
};
pub use ports::{
    CatalogEntry, ChannelEventSink, CredentialStore, CredentialStoreError, ExecutionEventSink,
    LocalNode, ModelError, ModelProvider, ModelTurn, NodeBinding, NodeCatalog, NodeContext,
    NoopEventSink, ToolSpec,
};
pub use settings::{
    DEFAULT_EXECUTION_TIMEOUT_SECS, DEFAULT_MAX_STEPS, DEFAULT_MODEL, DEFAULT_TOOL_TIMEOUT_SECS,
    EngineSettings, SettingsError, SettingsUpdate, validate_settings,
};

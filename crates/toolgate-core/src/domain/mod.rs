//! Domain types.
//!
//! Pure data: no I/O, no infrastructure types in any signature.

mod credential;
mod execution;
mod node;
mod server;
mod tool;
mod workflow;

pub use credential::{Credential, InjectedAuth};
pub use execution::{
    ChatMessage, ExecutionEvent, ExecutionEventType, ExecutionState, ExecutionStatus,
    MessageRole, ToolCallRequest,
};
pub use node::{NodeCategory, NodeDefinition, NodeInput, NodeInputType, NodeOutput};
pub use server::{ConnectionParams, ServerConfig, TransportKind};
pub use tool::{ToolInfo, ToolResult};
pub use workflow::{GraphEdge, NodeInstance, Position, Workflow, WorkflowGraph};

//! Tool bridge and bounded agent loop for toolgate.
//!
//! - [`catalog`]: the in-memory node catalog
//! - [`nodes`]: built-in local, API and tool-server nodes
//! - [`bridge`]: binds workflow nodes as model-callable tools
//! - [`engine`]: the step-bounded execution loop
//!
//! This crate depends only on `toolgate-core` and `toolgate-mcp`; model
//! providers and credential stores are injected through core's ports.
#![deny(unused_crate_dependencies)]

// Dev-dependency used only by the integration tests
#[cfg(test)]
use axum as _;

pub mod bridge;
pub mod catalog;
pub mod engine;
pub mod nodes;

pub use bridge::{BoundTool, BoundTools, ToolBridge, ToolCallError, ToolOutput, validate_inputs};
pub use catalog::InMemoryNodeCatalog;
pub use engine::Engine;

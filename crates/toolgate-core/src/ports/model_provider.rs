//! Model provider port.
//!
//! The engine asks the provider for one turn at a time. How the provider
//! reaches a model (HTTP API, local runtime, scripted fake) is not the
//! engine's concern.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{ChatMessage, ToolCallRequest};

/// A tool offered to the model for this execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the arguments.
    pub parameters: Value,
}

/// One model turn: either a text answer or a set of tool-call requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelTurn {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelTurn {
    /// A final text answer with no tool calls.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub const fn tools(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Errors from the model provider.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider could not be reached.
    #[error("Model provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with an error status.
    #[error("Model provider error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider's answer could not be interpreted.
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}

/// Port for asking a model for the next turn.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Produce the next turn given the conversation so far and the bound tools.
    ///
    /// # Errors
    ///
    /// Returns `ModelError` if the provider fails; the engine treats this as fatal.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError>;
}

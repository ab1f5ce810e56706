//! Execution state, conversation messages, and progress events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle of one execution. Terminal states are absorbing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout => false,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Provider-assigned call id, echoed back on the tool message.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One message in the execution's conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For tool messages: the call this observation answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool messages: the tool that produced the observation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(MessageRole::Assistant, content)
        }
    }

    pub fn tool(call: &ToolCallRequest, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(MessageRole::Tool, content)
        }
    }
}

/// Mutable state of one execution, owned exclusively by the engine.
#[derive(Debug, Clone, Default)]
pub struct ExecutionState {
    pub messages: Vec<ChatMessage>,
    /// Number of completed steps (turns that issued tool calls).
    pub current_step: u32,
    /// Latest tool output per node id.
    pub node_outputs: Map<String, Value>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
}

impl ExecutionState {
    pub fn new(first_message: ChatMessage) -> Self {
        Self {
            messages: vec![first_message],
            ..Self::default()
        }
    }

    /// Move to `next`, ignoring illegal transitions out of terminal states.
    pub fn transition(&mut self, next: ExecutionStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Kind of progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionEventType {
    Start,
    Step,
    Complete,
    Error,
}

impl ExecutionEventType {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Immutable progress event, the unit callers observe.
///
/// Wire shape: `{type, timestamp, data, trace_id, node_id, step_number}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub event_type: ExecutionEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Map<String, Value>,
    pub trace_id: String,
    pub node_id: Option<String>,
    pub step_number: Option<u32>,
}

impl ExecutionEvent {
    pub fn new(
        event_type: ExecutionEventType,
        trace_id: impl Into<String>,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
            trace_id: trace_id.into(),
            node_id: None,
            step_number: None,
        }
    }

    #[must_use]
    pub const fn with_step(mut self, step: u32) -> Self {
        self.step_number = Some(step);
        self
    }

    #[must_use]
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Format as a server-sent event frame.
    pub fn to_sse(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("data: {json}\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut state = ExecutionState::new(ChatMessage::user("hi"));
        assert!(state.transition(ExecutionStatus::Running));
        assert!(state.transition(ExecutionStatus::Completed));
        assert!(!state.transition(ExecutionStatus::Failed));
        assert_eq!(state.status, ExecutionStatus::Completed);
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Completed));
    }

    #[test]
    fn test_event_wire_shape() {
        let mut data = Map::new();
        data.insert("output".into(), json!("done"));
        let event = ExecutionEvent::new(ExecutionEventType::Complete, "trace-1", data).with_step(2);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "complete");
        assert_eq!(value["trace_id"], "trace-1");
        assert_eq!(value["step_number"], 2);
        assert!(value["node_id"].is_null());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_to_sse_framing() {
        let event = ExecutionEvent::new(ExecutionEventType::Start, "t", Map::new());
        let frame = event.to_sse();
        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("\n\n"));
    }
}

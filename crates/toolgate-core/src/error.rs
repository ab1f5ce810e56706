//! Node and execution error types.
//!
//! Transport, injector, and gateway errors live in `toolgate-mcp`; these are
//! the errors the agent layer produces and the engine's callers branch on.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable machine-readable code for a node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeErrorCode {
    MissingCredential,
    SyntaxError,
    EvaluationError,
    DivisionByZero,
    InvalidPath,
    ValidationError,
    ExecutionError,
    /// A remote API has no such resource.
    NotFound,
    /// A remote API rejected the credential.
    AuthError,
    /// A remote API answered with an error.
    ApiError,
    /// A remote API could not be reached.
    NetworkError,
}

impl NodeErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::SyntaxError => "SYNTAX_ERROR",
            Self::EvaluationError => "EVALUATION_ERROR",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::InvalidPath => "INVALID_PATH",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::AuthError => "AUTH_ERROR",
            Self::ApiError => "API_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
        }
    }
}

impl fmt::Display for NodeErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bad node input or configuration, detected before the node runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct NodeValidationError {
    pub message: String,
    /// Offending input name, when the problem is tied to one input.
    pub field: Option<String>,
}

impl NodeValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// A node ran and failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("[{code}] {node_name}: {message}")]
pub struct NodeExecutionError {
    pub message: String,
    pub node_name: String,
    pub code: NodeErrorCode,
    pub details: Option<Value>,
}

impl NodeExecutionError {
    pub fn new(node_name: impl Into<String>, code: NodeErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            node_name: node_name.into(),
            code,
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn missing_credential(node_name: impl Into<String>, credential_type: &str) -> Self {
        Self::new(
            node_name,
            NodeErrorCode::MissingCredential,
            format!("Missing credential of type '{credential_type}'"),
        )
    }
}

/// Failure of a single node call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("Validation failed: {0}")]
    Validation(#[from] NodeValidationError),

    #[error(transparent)]
    Execution(#[from] NodeExecutionError),
}

impl NodeError {
    pub const fn code(&self) -> NodeErrorCode {
        match self {
            Self::Validation(_) => NodeErrorCode::ValidationError,
            Self::Execution(e) => e.code,
        }
    }
}

/// Stable code for a failed execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorCode {
    MaxStepsExceeded,
    ExecutionFailed,
    Timeout,
    Cancelled,
}

impl ExecutionErrorCode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MaxStepsExceeded => "MAX_STEPS_EXCEEDED",
            Self::ExecutionFailed => "EXECUTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The only error an engine caller needs to branch on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct ExecutionError {
    pub code: ExecutionErrorCode,
    pub message: String,
}

impl ExecutionError {
    pub fn new(code: ExecutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn max_steps_exceeded(max_steps: u32) -> Self {
        Self::new(
            ExecutionErrorCode::MaxStepsExceeded,
            format!("Execution exceeded maximum steps ({max_steps})"),
        )
    }

    pub fn timeout(secs: u64) -> Self {
        Self::new(
            ExecutionErrorCode::Timeout,
            format!("Execution timed out after {secs}s"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ExecutionErrorCode::Cancelled, "Execution was cancelled")
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::ExecutionFailed, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_display_includes_code() {
        let err = ExecutionError::max_steps_exceeded(3);
        assert_eq!(err.code.as_str(), "MAX_STEPS_EXCEEDED");
        assert!(err.to_string().starts_with("[MAX_STEPS_EXCEEDED]"));
    }

    #[test]
    fn test_node_error_code() {
        let err: NodeError = NodeExecutionError::missing_credential("slack", "slack_oauth").into();
        assert_eq!(err.code(), NodeErrorCode::MissingCredential);

        let err: NodeError = NodeValidationError::for_field("text", "required").into();
        assert_eq!(err.code(), NodeErrorCode::ValidationError);
    }

    #[test]
    fn test_codes_serialize_screaming() {
        let json = serde_json::to_string(&ExecutionErrorCode::ExecutionFailed).unwrap();
        assert_eq!(json, "\"EXECUTION_FAILED\"");
        let json = serde_json::to_string(&NodeErrorCode::DivisionByZero).unwrap();
        assert_eq!(json, "\"DIVISION_BY_ZERO\"");

        for code in [NodeErrorCode::NotFound, NodeErrorCode::AuthError, NodeErrorCode::NetworkError] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}

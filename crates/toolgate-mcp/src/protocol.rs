//! MCP JSON-RPC 2.0 message types shared by every transport.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolgate_core::{ToolInfo, ToolResult};

use crate::transport::TransportError;

/// Protocol revision sent in `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name reported to tool servers.
pub const CLIENT_NAME: &str = "toolgate";

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no id, no response).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> JsonRpcNotification<'a> {
    pub fn new(method: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params: json!({}),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Whether this response answers request `id`.
    ///
    /// Servers may echo the id as a number or a string.
    pub fn answers(&self, id: u64) -> bool {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64() == Some(id),
            Some(Value::String(s)) => s.parse::<u64>().ok() == Some(id),
            _ => false,
        }
    }

    /// Numeric id, when present.
    pub fn numeric_id(&self) -> Option<u64> {
        match &self.id {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// Unwrap the result, mapping a JSON-RPC error object to a tool error.
    pub fn into_result(self, method: &str) -> Result<Value, TransportError> {
        if let Some(err) = self.error {
            return Err(TransportError::Tool(format!(
                "{method} failed: {} (code {})",
                err.message, err.code
            )));
        }
        self.result
            .ok_or_else(|| TransportError::Protocol(format!("{method}: missing result")))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Parameters of the `initialize` request.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {}
    })
}

/// Parameters of a `tools/call` request.
pub fn tool_call_params(name: &str, arguments: Value) -> Value {
    let arguments = if arguments.is_null() {
        json!({})
    } else {
        arguments
    };
    json!({ "name": name, "arguments": arguments })
}

/// Parse the result of `tools/list`.
pub fn parse_tool_list(result: Value) -> Result<Vec<ToolInfo>, TransportError> {
    let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
    serde_json::from_value(tools)
        .map_err(|e| TransportError::Protocol(format!("invalid tools/list result: {e}")))
}

/// Interpret the result of `tools/call`.
///
/// `isError: true` is an application-level failure reported by the tool.
pub fn parse_tool_call(result: Value) -> Result<ToolResult, TransportError> {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let content = result.get("content").cloned().unwrap_or_else(|| json!([]));

    if is_error {
        let message = content
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get("text"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        return Err(TransportError::Tool(message));
    }

    Ok(ToolResult::new(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_omits_missing_params() {
        let json = serde_json::to_string(&JsonRpcRequest::new(1, "tools/list", None)).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_response_matches_numeric_and_string_ids() {
        let response: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#).unwrap();
        assert!(response.answers(7));
        assert!(!response.answers(8));

        let response: JsonRpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"7","result":{}}"#).unwrap();
        assert!(response.answers(7));
    }

    #[test]
    fn test_error_object_becomes_tool_error() {
        let response: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32602,"message":"Unknown tool"}}"#,
        )
        .unwrap();
        let err = response.into_result("tools/call").unwrap_err();
        assert!(matches!(err, TransportError::Tool(msg) if msg.contains("Unknown tool")));
    }

    #[test]
    fn test_parse_tool_list_defaults() {
        let tools = parse_tool_list(json!({"tools": [{"name": "echo"}]})).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description, "");
        assert_eq!(tools[0].input_schema, json!({}));

        assert!(parse_tool_list(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_parse_tool_call_is_error() {
        let err = parse_tool_call(json!({
            "content": [{"type": "text", "text": "channel not found"}],
            "isError": true
        }))
        .unwrap_err();
        assert!(matches!(err, TransportError::Tool(msg) if msg == "channel not found"));

        let ok = parse_tool_call(json!({"content": [{"type": "text", "text": "ok"}]})).unwrap();
        assert_eq!(ok.to_text(), "ok");
    }

    #[test]
    fn test_tool_call_params_defaults_arguments() {
        let params = tool_call_params("echo", Value::Null);
        assert_eq!(params["arguments"], json!({}));
    }
}

//! Tool descriptors and results as exchanged with tool servers.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A tool discovered on a connected server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments. Documentation only; the gateway does not enforce it.
    #[serde(default = "empty_object", rename = "inputSchema")]
    pub input_schema: Value,
}

fn empty_object() -> Value {
    json!({})
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_object(),
        }
    }
}

/// Successful result of a tool call.
///
/// `content` is the MCP content array (`[{"type": "text", "text": ...}, ...]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Value,
}

impl ToolResult {
    pub const fn new(content: Value) -> Self {
        Self { content }
    }

    /// Convenience constructor for a single text item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: json!([{ "type": "text", "text": text.into() }]),
        }
    }

    /// Render the result as text for a model observation.
    ///
    /// Text items are joined with newlines; any other shape falls back to JSON.
    pub fn to_text(&self) -> String {
        if let Some(items) = self.content.as_array() {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(Value::as_str))
                .collect();
            if !texts.is_empty() && texts.len() == items.len() {
                return texts.join("\n");
            }
        }
        match &self.content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text_joins_text_items() {
        let result = ToolResult::new(json!([
            {"type": "text", "text": "first"},
            {"type": "text", "text": "second"}
        ]));
        assert_eq!(result.to_text(), "first\nsecond");
    }

    #[test]
    fn test_to_text_falls_back_to_json_for_mixed_content() {
        let result = ToolResult::new(json!([
            {"type": "text", "text": "caption"},
            {"type": "image", "data": "..."}
        ]));
        assert!(result.to_text().starts_with('['));
    }

    #[test]
    fn test_tool_info_defaults() {
        let info: ToolInfo = serde_json::from_str(r#"{"name":"search"}"#).unwrap();
        assert_eq!(info.description, "");
        assert_eq!(info.input_schema, json!({}));
    }
}

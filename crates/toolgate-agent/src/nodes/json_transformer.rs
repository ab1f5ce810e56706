//! Path-based extraction from JSON documents.
//!
//! Paths start at the root `$` and chain `.key`, `[index]` and `['key']`
//! segments, e.g. `$.users[0].name`. A path that walks off the document is
//! not an error: the node reports `matched: false` instead.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use toolgate_core::{
    LocalNode, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeErrorCode,
    NodeExecutionError, NodeInput, NodeInputType, NodeOutput, NodeValidationError,
};

pub const NAME: &str = "json_transformer";

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(
        NAME,
        "JSON Transformer",
        "Extract data from JSON using path expressions",
        NodeCategory::Tool,
    )
    .with_input(NodeInput::new("data", NodeInputType::Any).describe("Input JSON data"))
    .with_input(
        NodeInput::new("path", NodeInputType::String)
            .describe("JSONPath expression (e.g., $.users[0].name)"),
    )
    .with_output(NodeOutput::new("result", NodeInputType::Any))
    .with_output(NodeOutput::new("matched", NodeInputType::Boolean))
    .with_tags(["json", "transform", "extract"])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

#[async_trait]
impl LocalNode for JsonTransformer {
    async fn execute(
        &self,
        input: Map<String, Value>,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let (data, path) = validate(&input)?;
        let selected = select(&data, path)
            .map_err(|message| NodeExecutionError::new(NAME, NodeErrorCode::InvalidPath, message))?;

        Ok(match selected {
            Some(value) => json!({ "result": value, "matched": true }),
            None => json!({ "result": Value::Null, "matched": false }),
        })
    }
}

fn validate(input: &Map<String, Value>) -> Result<(Value, &str), NodeValidationError> {
    let data = match input.get("data") {
        None | Some(Value::Null) => {
            return Err(NodeValidationError::for_field("data", "Data is required"));
        }
        Some(value @ (Value::Object(_) | Value::Array(_))) => value.clone(),
        // Documents often arrive as serialized text from an earlier tool.
        Some(Value::String(text)) => serde_json::from_str(text).map_err(|e| {
            NodeValidationError::for_field("data", format!("Invalid JSON string: {e}"))
        })?,
        Some(_) => {
            return Err(NodeValidationError::for_field(
                "data",
                "Data must be a JSON object or array",
            ));
        }
    };

    let path = match input.get("path") {
        Some(Value::String(path)) if !path.is_empty() => path.as_str(),
        Some(Value::String(_)) | None | Some(Value::Null) => {
            return Err(NodeValidationError::for_field("path", "Path is required"));
        }
        Some(_) => return Err(NodeValidationError::for_field("path", "Path must be a string")),
    };

    if !path.starts_with('$') {
        return Err(NodeValidationError::for_field("path", "Path must start with '$'"));
    }

    Ok((data, path))
}

/// Walk `path` through `data`.
///
/// Returns `Ok(None)` when a key is absent, an index is out of range, or a
/// segment meets the wrong kind of value.
///
/// # Errors
///
/// Returns a message when the path itself is malformed.
pub fn select<'a>(data: &'a Value, path: &str) -> Result<Option<&'a Value>, String> {
    let Some(mut remaining) = path.strip_prefix('$') else {
        return Err("Path must start with '$'".to_string());
    };
    let mut current = data;

    while !remaining.is_empty() {
        if let Some(rest) = remaining.strip_prefix('.') {
            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let (key, tail) = rest.split_at(end);
            remaining = tail;

            match current.get(key) {
                Some(next) if current.is_object() => current = next,
                _ => return Ok(None),
            }
        } else if remaining.starts_with('[') {
            let Some(end) = remaining.find(']') else {
                return Err("Unclosed bracket in path".to_string());
            };
            let inner = &remaining[1..end];
            remaining = &remaining[end + 1..];

            if let Ok(index) = inner.trim().parse::<i64>() {
                let next = usize::try_from(index)
                    .ok()
                    .and_then(|i| current.as_array().and_then(|items| items.get(i)));
                match next {
                    Some(next) => current = next,
                    None => return Ok(None),
                }
            } else if let Some(key) = inner
                .strip_prefix('\'')
                .and_then(|k| k.strip_suffix('\''))
            {
                match current.as_object().and_then(|map| map.get(key)) {
                    Some(next) => current = next,
                    None => return Ok(None),
                }
            } else {
                return Err(format!("Invalid index: {inner}"));
            }
        } else {
            return Err(format!("Invalid path syntax at: {remaining}"));
        }
    }

    Ok(Some(current))
}

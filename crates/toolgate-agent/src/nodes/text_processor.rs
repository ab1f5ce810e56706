//! Text transformations.

use std::str::FromStr;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use toolgate_core::{
    LocalNode, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeInput, NodeInputType,
    NodeOutput, NodeValidationError,
};

pub const NAME: &str = "text_processor";

/// A supported transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOperation {
    Uppercase,
    Lowercase,
    Trim,
    Reverse,
    Capitalize,
    Title,
}

impl TextOperation {
    pub const ALL: [Self; 6] = [
        Self::Uppercase,
        Self::Lowercase,
        Self::Trim,
        Self::Reverse,
        Self::Capitalize,
        Self::Title,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Uppercase => "uppercase",
            Self::Lowercase => "lowercase",
            Self::Trim => "trim",
            Self::Reverse => "reverse",
            Self::Capitalize => "capitalize",
            Self::Title => "title",
        }
    }

    pub fn apply(self, text: &str) -> String {
        match self {
            Self::Uppercase => text.to_uppercase(),
            Self::Lowercase => text.to_lowercase(),
            Self::Trim => text.trim().to_string(),
            Self::Reverse => text.chars().rev().collect(),
            Self::Capitalize => {
                let mut chars = text.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect()
                })
            }
            Self::Title => {
                let mut out = String::with_capacity(text.len());
                let mut in_word = false;
                for c in text.chars() {
                    if c.is_alphabetic() {
                        if in_word {
                            out.extend(c.to_lowercase());
                        } else {
                            out.extend(c.to_uppercase());
                        }
                        in_word = true;
                    } else {
                        out.push(c);
                        in_word = false;
                    }
                }
                out
            }
        }
    }
}

impl FromStr for TextOperation {
    type Err = NodeValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|op| op.as_str() == s).ok_or_else(|| {
            let names: Vec<&str> = Self::ALL.iter().map(Self::as_str).collect();
            NodeValidationError::for_field(
                "operation",
                format!("Invalid operation: {s}. Must be one of: {}", names.join(", ")),
            )
        })
    }
}

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(
        NAME,
        "Text Processor",
        "Transform text with various operations",
        NodeCategory::Tool,
    )
    .with_input(NodeInput::new("text", NodeInputType::String).describe("Input text to process"))
    .with_input(
        NodeInput::new("operation", NodeInputType::String)
            .describe("Processing operation")
            .with_options(TextOperation::ALL.iter().map(TextOperation::as_str)),
    )
    .with_output(NodeOutput::new("result", NodeInputType::String))
    .with_output(NodeOutput::new("original_length", NodeInputType::Number))
    .with_output(NodeOutput::new("result_length", NodeInputType::Number))
    .with_tags(["text", "string", "transform"])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextProcessor;

#[async_trait]
impl LocalNode for TextProcessor {
    async fn execute(
        &self,
        input: Map<String, Value>,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let text = match input.get("text") {
            None | Some(Value::Null) => {
                return Err(NodeValidationError::for_field("text", "Text is required").into());
            }
            Some(Value::String(text)) => text,
            Some(_) => {
                return Err(NodeValidationError::for_field("text", "Text must be a string").into());
            }
        };

        let operation: TextOperation = match input.get("operation").and_then(Value::as_str) {
            Some(op) if !op.is_empty() => op.parse()?,
            _ => {
                return Err(
                    NodeValidationError::for_field("operation", "Operation is required").into(),
                );
            }
        };

        let result = operation.apply(text);
        Ok(json!({
            "result": result,
            "original_length": text.chars().count(),
            "result_length": result.chars().count(),
        }))
    }
}

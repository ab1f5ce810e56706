//! Node definitions supplied by the node catalog.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Node category for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeCategory {
    /// Built-in tools, no auth required
    Tool,
    /// External APIs, API key required
    Api,
    /// Tool-server integrations, user-scoped auth
    Mcp,
}

impl NodeCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Api => "api",
            Self::Mcp => "mcp",
        }
    }
}

/// Declared type of a node input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeInputType {
    String,
    Number,
    Boolean,
    Json,
    Array,
    File,
    Any,
}

impl NodeInputType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::Array => "array",
            Self::File => "file",
            Self::Any => "any",
        }
    }

    /// Whether `value` is acceptable for this declared type.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String | Self::File => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Json | Self::Any => true,
        }
    }

    /// JSON Schema fragment for this type.
    fn schema(self) -> Value {
        match self {
            Self::String | Self::File => json!({"type": "string"}),
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Array => json!({"type": "array"}),
            Self::Json => json!({"type": "object"}),
            Self::Any => json!({}),
        }
    }
}

/// Definition of a node input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInput {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub input_type: NodeInputType,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Allowed values for enum-like string inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

const fn default_required() -> bool {
    true
}

impl NodeInput {
    pub fn new(name: impl Into<String>, input_type: NodeInputType) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            input_type,
            description: String::new(),
            required: true,
            default: None,
            options: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = Some(options.into_iter().map(Into::into).collect());
        self
    }
}

/// Definition of a node output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub name: String,
    #[serde(rename = "type")]
    pub output_type: NodeInputType,
    #[serde(default)]
    pub description: String,
}

impl NodeOutput {
    pub fn new(name: impl Into<String>, output_type: NodeInputType) -> Self {
        Self {
            name: name.into(),
            output_type,
            description: String::new(),
        }
    }
}

/// Complete node definition with metadata and input schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique node type name; doubles as the tool name shown to the model.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub category: NodeCategory,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    #[serde(default)]
    pub outputs: Vec<NodeOutput>,
    /// Credential type the node needs at call time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<String>,
    /// Owning tool server for MCP-backed nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_server_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NodeDefinition {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
        category: NodeCategory,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            category,
            inputs: Vec::new(),
            outputs: Vec::new(),
            credential_type: None,
            mcp_server_id: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: NodeInput) -> Self {
        self.inputs.push(input);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: NodeOutput) -> Self {
        self.outputs.push(output);
        self
    }

    #[must_use]
    pub fn with_credential_type(mut self, credential_type: impl Into<String>) -> Self {
        self.credential_type = Some(credential_type.into());
        self
    }

    #[must_use]
    pub fn with_server(mut self, server_id: impl Into<String>) -> Self {
        self.mcp_server_id = Some(server_id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Render the declared inputs as a JSON Schema object for the model provider.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for input in &self.inputs {
            let mut schema = input.input_type.schema();
            if let Value::Object(fields) = &mut schema {
                if !input.description.is_empty() {
                    fields.insert("description".into(), json!(input.description));
                }
                if let Some(options) = &input.options {
                    fields.insert("enum".into(), json!(options));
                }
                if let Some(default) = &input.default {
                    fields.insert("default".into(), default.clone());
                }
            }
            properties.insert(input.name.clone(), schema);
            if input.required {
                required.push(Value::String(input.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

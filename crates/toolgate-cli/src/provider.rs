//! OpenAI-compatible chat-completions model provider.
//!
//! Posts the conversation and the bound tools to `{base_url}/chat/completions`
//! and maps `choices[0].message` back into a [`ModelTurn`]. Works with any
//! server that speaks the same wire format.

use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_core::{
    ChatMessage, EngineSettings, MessageRole, ModelError, ModelProvider, ModelTurn,
    ToolCallRequest, ToolSpec,
};

pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl OpenAiProvider {
    pub fn new(base_url: &str, api_key: impl Into<String>, settings: &EngineSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: settings.effective_model().to_string(),
            temperature: settings.effective_temperature(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": format_messages(messages),
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(format_tools(tools));
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<ModelTurn, ModelError> {
        let body = self.request_body(messages, tools);
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Requesting model turn"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        parse_turn(&body)
    }
}

fn format_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| {
            let mut m = json!({
                "role": msg.role.as_str(),
                "content": msg.content,
            });
            if msg.role == MessageRole::Assistant && !msg.tool_calls.is_empty() {
                if msg.content.is_empty() {
                    m["content"] = Value::Null;
                }
                m["tool_calls"] = msg
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
            }
            if let Some(id) = &msg.tool_call_id {
                m["tool_call_id"] = json!(id);
            }
            if let Some(name) = &msg.name {
                m["name"] = json!(name);
            }
            m
        })
        .collect()
}

fn format_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

/// Map a chat-completions response body into a turn.
fn parse_turn(body: &Value) -> Result<ModelTurn, ModelError> {
    let message = &body["choices"][0]["message"];
    if !message.is_object() {
        return Err(ModelError::InvalidResponse(
            "Response has no choices[0].message".into(),
        ));
    }

    let content = message["content"]
        .as_str()
        .filter(|text| !text.is_empty())
        .map(String::from);

    let mut tool_calls = Vec::new();
    for (index, call) in message["tool_calls"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
    {
        let name = call["function"]["name"].as_str().ok_or_else(|| {
            ModelError::InvalidResponse(format!("Tool call {index} has no function name"))
        })?;
        let id = call["id"]
            .as_str()
            .map_or_else(|| format!("call_{index}"), String::from);
        tool_calls.push(ToolCallRequest::new(
            id,
            name,
            arguments(&call["function"]["arguments"]),
        ));
    }

    Ok(ModelTurn {
        content,
        tool_calls,
    })
}

/// Arguments arrive as a JSON-encoded string. Text that does not parse is
/// passed through so the tool bridge reports it back to the model.
fn arguments(raw: &Value) -> Value {
    match raw {
        Value::String(text) if text.trim().is_empty() => json!({}),
        Value::String(text) => serde_json::from_str(text).unwrap_or_else(|_| raw.clone()),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        let settings = EngineSettings {
            model: Some("gpt-test".into()),
            ..EngineSettings::default()
        };
        OpenAiProvider::new("http://localhost:8080/v1/", "sk-test", &settings)
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        assert_eq!(
            provider().endpoint(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_body_shapes_tool_history() {
        let call = ToolCallRequest::new("c1", "calculator", json!({"expression": "1+1"}));
        let messages = vec![
            ChatMessage::user("add"),
            ChatMessage::assistant("", vec![call.clone()]),
            ChatMessage::tool(&call, "2"),
        ];
        let tools = vec![ToolSpec {
            name: "calculator".into(),
            description: "Math".into(),
            parameters: json!({"type": "object"}),
        }];

        let body = provider().request_body(&messages, &tools);
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["tools"][0]["function"]["name"], "calculator");

        let assistant = &body["messages"][1];
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["type"], "function");
        assert_eq!(
            assistant["tool_calls"][0]["function"]["arguments"],
            r#"{"expression":"1+1"}"#
        );

        let tool = &body["messages"][2];
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "c1");
        assert_eq!(tool["content"], "2");
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let body = provider().request_body(&[ChatMessage::user("hi")], &[]);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_text_turn() {
        let turn = parse_turn(&json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello"}}]
        }))
        .unwrap();
        assert_eq!(turn, ModelTurn::text("Hello"));
    }

    #[test]
    fn test_parse_tool_calls() {
        let turn = parse_turn(&json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_a", "type": "function",
                     "function": {"name": "calculator", "arguments": "{\"expression\": \"2*3\"}"}},
                    {"type": "function",
                     "function": {"name": "text_processor", "arguments": "not json"}}
                ]
            }}]
        }))
        .unwrap();

        assert!(turn.content.is_none());
        assert_eq!(turn.tool_calls.len(), 2);
        assert_eq!(turn.tool_calls[0].id, "call_a");
        assert_eq!(turn.tool_calls[0].arguments, json!({"expression": "2*3"}));
        assert_eq!(turn.tool_calls[1].id, "call_1");
        assert_eq!(turn.tool_calls[1].arguments, json!("not json"));
    }

    #[test]
    fn test_parse_rejects_malformed_bodies() {
        assert!(matches!(
            parse_turn(&json!({"error": "nope"})),
            Err(ModelError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_turn(&json!({"choices": [{"message": {"tool_calls": [{"id": "x"}]}}]})),
            Err(ModelError::InvalidResponse(_))
        ));
    }
}

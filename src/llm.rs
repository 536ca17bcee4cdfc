//! Completion endpoint capability.
//!
//! [`CompletionClient`] is the seam between the generator and any chat
//! completion API: `complete(messages, tool_schemas) → Completion`.
//! [`OpenAiChatClient`] speaks the OpenAI `POST /chat/completions` wire
//! format, which most hosted and local servers accept.
//!
//! Completion errors are never retried here; the generator surfaces them as
//! [`RagError::Generation`].

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{RagError, RagResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One message of the working transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Set on assistant messages that requested tools.
    pub tool_calls: Vec<ToolCall>,
    /// Set on tool messages; the id of the call being answered.
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// OpenAI chat message JSON.
    pub fn to_wire(&self) -> Value {
        let mut msg = json!({
            "role": self.role.as_str(),
            "content": self.content,
        });
        if let Some(obj) = msg.as_object_mut() {
            if !self.tool_calls.is_empty() {
                let calls: Vec<Value> = self
                    .tool_calls
                    .iter()
                    .map(|c| {
                        let arguments = match &c.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": arguments }
                        })
                    })
                    .collect();
                obj.insert("tool_calls".to_string(), Value::Array(calls));
            }
            if let Some(id) = &self.tool_call_id {
                obj.insert("tool_call_id".to_string(), json!(id));
            }
        }
        msg
    }
}

/// The model's reply to one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: None,
            tool_calls: calls,
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the transcript; `tools` are OpenAI function schemas, possibly empty.
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> RagResult<Completion>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl OpenAiChatClient {
    /// Build from `[llm]`. The API key is read from the environment variable
    /// named by `api_key_env`; when unset, requests go out unauthenticated
    /// (local servers).
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "no API key in environment; completion requests are unauthenticated"
            );
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[Value]) -> RagResult<Completion> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.model,
            "messages": messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if !tools.is_empty() {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("tools".to_string(), json!(tools));
                obj.insert("tool_choice".to_string(), json!("auto"));
            }
        }

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request.send().await.map_err(RagError::generation)?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "completion endpoint returned {}: {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(RagError::generation)?;
        parse_completion(&payload)
    }
}

/// Read `choices[0].message` into a [`Completion`].
pub fn parse_completion(payload: &Value) -> RagResult<Completion> {
    let message = payload
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| RagError::Generation("malformed response: missing choices".to_string()))?;

    let text = message["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let name = call["function"]["name"].as_str().ok_or_else(|| {
                RagError::Generation("malformed response: tool call without name".to_string())
            })?;
            let arguments = match &call["function"]["arguments"] {
                Value::String(raw) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
                }
                Value::Null => json!({}),
                other => other.clone(),
            };
            tool_calls.push(ToolCall {
                id: call["id"].as_str().unwrap_or_default().to_string(),
                name: name.to_string(),
                arguments,
            });
        }
    }

    if text.is_none() && tool_calls.is_empty() {
        return Err(RagError::Generation(
            "malformed response: no content and no tool calls".to_string(),
        ));
    }

    Ok(Completion { text, tool_calls })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_completion() {
        let payload = json!({
            "choices": [{"message": {"role": "assistant", "content": "A vector is an arrow."}}]
        });
        let c = parse_completion(&payload).unwrap();
        assert_eq!(c.text.as_deref(), Some("A vector is an arrow."));
        assert!(!c.wants_tools());
    }

    #[test]
    fn test_parse_tool_call_arguments() {
        let payload = json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "search_course_content",
                        "arguments": "{\"query\":\"vectors\",\"lesson_number\":1}"
                    }
                }]
            }}]
        });
        let c = parse_completion(&payload).unwrap();
        assert!(c.text.is_none());
        assert_eq!(c.tool_calls.len(), 1);
        assert_eq!(c.tool_calls[0].id, "call_1");
        assert_eq!(c.tool_calls[0].arguments["query"], "vectors");
        assert_eq!(c.tool_calls[0].arguments["lesson_number"], 1);
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_completion(&json!({"error": "boom"})),
            Err(RagError::Generation(_))
        ));
        assert!(matches!(
            parse_completion(&json!({"choices": [{"message": {"content": ""}}]})),
            Err(RagError::Generation(_))
        ));
    }

    #[test]
    fn test_wire_format_for_tool_messages() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "search_course_content".to_string(),
            arguments: json!({"query": "q"}),
        };
        let assistant = ChatMessage::assistant_tool_calls(None, vec![call]).to_wire();
        assert_eq!(assistant["role"], "assistant");
        assert!(assistant["content"].is_null());
        assert_eq!(assistant["tool_calls"][0]["function"]["arguments"], "{\"query\":\"q\"}");

        let tool = ChatMessage::tool_result("call_1", "results").to_wire();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
        assert_eq!(tool["content"], "results");
    }
}

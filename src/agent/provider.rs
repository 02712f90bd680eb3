//! LLM provider interface (spec.md §6) and its Ollama implementation,
//! generalized from the teacher's inline `PawanAgent::generate_with_tools`/
//! `generate_streaming`/`generate_non_streaming`/`parse_ollama_response`
//! methods into a trait any backend can implement.

use super::message::{Message, ParsedResponse, Role, ToolCall};
use crate::tools::ToolDefinition;
use crate::{PawanError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// One turn's worth of model interaction: send the conversation plus the
/// tool catalog, get back text and/or tool calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ParsedResponse>;
}

fn message_to_ollama_json(message: &Message) -> Value {
    match message.role {
        Role::System => json!({"role": "system", "content": message.content.as_text()}),
        Role::User => json!({"role": "user", "content": message.content.as_text()}),
        Role::Assistant => {
            if message.tool_calls.is_empty() {
                json!({"role": "assistant", "content": message.content.as_text()})
            } else {
                let tool_calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "function": {
                                "name": tc.tool_name,
                                "arguments": tc.parameters,
                            }
                        })
                    })
                    .collect();
                json!({
                    "role": "assistant",
                    "content": message.content.as_text(),
                    "tool_calls": tool_calls,
                })
            }
        }
        Role::Tool => json!({"role": "tool", "content": message.content.as_text()}),
    }
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| tc.get("function"))
                .map(|func| ToolCall {
                    id: uuid::Uuid::new_v4().to_string(),
                    tool_name: func.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                    parameters: func.get("arguments").cloned().unwrap_or(json!({})),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Talks to a local Ollama server's `/api/chat` endpoint.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, temperature: f32, top_p: f32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(300))
                .build()
                .expect("reqwest client builder with static config"),
            base_url: base_url.into(),
            model: model.into(),
            temperature,
            top_p,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<ParsedResponse> {
        let ollama_messages: Vec<Value> = messages.iter().map(message_to_ollama_json).collect();

        let ollama_tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();

        let request_body = json!({
            "model": self.model,
            "messages": ollama_messages,
            "tools": ollama_tools,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "top_p": self.top_p,
            }
        });

        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PawanError::Llm(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PawanError::Llm(format!("Ollama request failed ({status}): {text}")));
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| PawanError::Llm(format!("Failed to parse response: {e}")))?;

        let message = response_json
            .get("message")
            .ok_or_else(|| PawanError::Llm("No message in response".into()))?;

        let text = message.get("content").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let tool_calls = parse_tool_calls(message);

        Ok(ParsedResponse {
            text: (!text.is_empty()).then_some(text),
            tool_calls,
        })
    }
}

/// Fixed-script provider for tests: returns one queued response per call, in
/// order, falling back to an empty response once exhausted.
pub struct ScriptedProvider {
    responses: std::sync::Mutex<std::collections::VecDeque<ParsedResponse>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ParsedResponse>) -> Self {
        Self { responses: std::sync::Mutex::new(responses.into()) }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<ParsedResponse> {
        let mut queue = self.responses.lock().unwrap();
        Ok(queue.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ToolCall;

    #[test]
    fn message_to_ollama_json_includes_tool_calls() {
        let message = Message::assistant(
            "",
            vec![ToolCall { id: "1".into(), tool_name: "read_file".into(), parameters: json!({"path": "a"}) }],
        );
        let value = message_to_ollama_json(&message);
        assert_eq!(value["tool_calls"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn parse_tool_calls_extracts_function_name_and_arguments() {
        let message = json!({
            "content": "",
            "tool_calls": [{"function": {"name": "glob", "arguments": {"pattern": "*.rs"}}}]
        });
        let calls = parse_tool_calls(&message);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "glob");
        assert_eq!(calls[0].parameters["pattern"], "*.rs");
    }

    #[tokio::test]
    async fn scripted_provider_returns_queued_responses_in_order() {
        let provider = ScriptedProvider::new(vec![
            ParsedResponse { text: Some("first".into()), tool_calls: vec![] },
            ParsedResponse { text: Some("second".into()), tool_calls: vec![] },
        ]);
        let first = provider.chat(&[], &[]).await.unwrap();
        let second = provider.chat(&[], &[]).await.unwrap();
        assert_eq!(first.text.unwrap(), "first");
        assert_eq!(second.text.unwrap(), "second");
    }
}

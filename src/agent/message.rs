//! Wire data model: `Message`, `ToolCall`, `ToolResult`, and friends.
//!
//! Shapes follow spec.md §3, generalized from the teacher's flatter
//! `Message`/`ToolCallRequest`/`ToolResultMessage` trio in `pawan/src/agent/mod.rs`
//! into the tagged-content form the runtime needs (text vs. inline-data parts,
//! a closed `TerminateReason` enum).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    InlineData { mime_type: String, data_base64: String },
}

/// A message's content: either plain text or an ordered sequence of parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    ContentPart::InlineData { mime_type, .. } => {
                        Some(format!("[inline data: {mime_type}]"))
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Content,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Content::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::Text(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(text.into()),
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, name: impl Into<String>, content: Content) -> Self {
        Self {
            role: Role::Tool,
            content,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Why the agent loop stopped (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminateReason {
    Goal,
    MaxTurns,
    Timeout,
    ErrorNoCompleteTaskCall,
    Error,
    Cancelled,
}

/// Process-scoped state for one `run()` call (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub turn_count: u32,
    pub terminate_reason: Option<TerminateReason>,
    pub storage: HashMap<String, serde_json::Value>,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// The model's parsed response to one `Invoke` step (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct ParsedResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

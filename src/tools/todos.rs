//! `write_todos` — replaces the agent's in-memory todo list, enforcing the
//! single-in-progress invariant (spec.md §4.5.10).

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const VALID_STATUSES: [&str; 4] = ["pending", "in_progress", "completed", "cancelled"];

fn status_symbol(status: &str) -> &'static str {
    match status {
        "pending" => "○",
        "in_progress" => "◉",
        "completed" => "✓",
        "cancelled" => "✗",
        _ => "?",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub index: usize,
    pub description: String,
    pub status: String,
}

pub struct WriteTodosTool;

impl WriteTodosTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WriteTodosTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteTodosTool {
    fn name(&self) -> &str {
        "write_todos"
    }

    fn description(&self) -> &str {
        "Replace the current todo list for tracking subtasks of a complex, multi-step query. \
         At most one task may be 'in_progress' at a time; mark a task in_progress before \
         starting it and update its status immediately on completion or cancellation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "description": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "cancelled"]
                            }
                        },
                        "required": ["description", "status"]
                    }
                }
            },
            "required": ["todos"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let todos = match args["todos"].as_array() {
            Some(t) => t,
            None => return ToolResult::err("'todos' must be an array.", ToolErrorType::InvalidInput),
        };

        let mut validated = Vec::with_capacity(todos.len());
        let mut in_progress_count = 0;

        for (i, todo) in todos.iter().enumerate() {
            if !todo.is_object() {
                return ToolResult::err(
                    format!("Todo {}: Must be an object.", i + 1),
                    ToolErrorType::InvalidStatus,
                );
            }
            let description = todo["description"].as_str().unwrap_or("").trim();
            if description.is_empty() {
                return ToolResult::err(
                    format!("Todo {}: 'description' is required and must be non-empty.", i + 1),
                    ToolErrorType::MissingDescription,
                );
            }
            let status = todo["status"].as_str().unwrap_or("");
            if !VALID_STATUSES.contains(&status) {
                return ToolResult::err(
                    format!(
                        "Todo {}: Invalid status '{status}'. Must be one of: {}",
                        i + 1,
                        VALID_STATUSES.join(", ")
                    ),
                    ToolErrorType::InvalidStatus,
                );
            }
            if status == "in_progress" {
                in_progress_count += 1;
            }
            validated.push(Todo {
                index: i + 1,
                description: description.to_string(),
                status: status.to_string(),
            });
        }

        if in_progress_count > 1 {
            return ToolResult::err(
                format!("Only one task can be 'in_progress' at a time. Found {in_progress_count}."),
                ToolErrorType::MultipleInProgress,
            );
        }

        if validated.is_empty() {
            return ToolResult::ok_with_data(
                "Todo list cleared.",
                "Todo list cleared.",
                json!({"success": true, "todos": [], "count": 0}),
            );
        }

        let formatted: Vec<String> = validated
            .iter()
            .map(|t| format!("{}. [{}] [{}] {}", t.index, status_symbol(&t.status), t.status, t.description))
            .collect();

        let mut counts = std::collections::HashMap::new();
        for status in VALID_STATUSES {
            counts.insert(status, 0usize);
        }
        for t in &validated {
            *counts.get_mut(t.status.as_str()).unwrap() += 1;
        }

        let mut summary_parts = Vec::new();
        if counts["completed"] > 0 {
            summary_parts.push(format!("{} completed", counts["completed"]));
        }
        if counts["in_progress"] > 0 {
            summary_parts.push(format!("{} in progress", counts["in_progress"]));
        }
        if counts["pending"] > 0 {
            summary_parts.push(format!("{} pending", counts["pending"]));
        }
        if counts["cancelled"] > 0 {
            summary_parts.push(format!("{} cancelled", counts["cancelled"]));
        }
        let summary = if summary_parts.is_empty() { "empty".to_string() } else { summary_parts.join(", ") };

        ToolResult::ok_with_data(
            formatted.join("\n"),
            format!("Successfully updated the todo list. Current status: {summary}."),
            json!({
                "success": true,
                "todos": validated,
                "count": validated.len(),
                "summary": counts,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepts_valid_todo_list() {
        let tool = WriteTodosTool::new();
        let result = tool
            .invoke(json!({"todos": [
                {"description": "write code", "status": "in_progress"},
                {"description": "review", "status": "pending"},
            ]}))
            .await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["count"], 2);
    }

    #[tokio::test]
    async fn rejects_multiple_in_progress() {
        let tool = WriteTodosTool::new();
        let result = tool
            .invoke(json!({"todos": [
                {"description": "a", "status": "in_progress"},
                {"description": "b", "status": "in_progress"},
            ]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::MultipleInProgress);
    }

    #[tokio::test]
    async fn rejects_empty_description() {
        let tool = WriteTodosTool::new();
        let result = tool
            .invoke(json!({"todos": [{"description": "  ", "status": "pending"}]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::MissingDescription);
    }

    #[tokio::test]
    async fn rejects_invalid_status() {
        let tool = WriteTodosTool::new();
        let result = tool
            .invoke(json!({"todos": [{"description": "a", "status": "bogus"}]}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidStatus);
    }

    #[tokio::test]
    async fn empty_list_clears_todos() {
        let tool = WriteTodosTool::new();
        let result = tool.invoke(json!({"todos": []})).await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["count"], 0);
    }
}

//! `complete_task` — the terminator tool (spec.md §4.4, §4.5.13).
//!
//! Its real effect lives in the termination middleware, which inspects the
//! parsed response for a call to this tool *before* dispatch and short
//! circuits the turn (clearing any co-called tools, setting
//! `terminate_reason = GOAL`) rather than ever invoking this body. `invoke`
//! exists so the tool still has a well-defined result if something upstream
//! dispatches it directly (e.g. a unit test exercising the registry).

use super::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};

pub struct CompleteTaskTool;

impl CompleteTaskTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CompleteTaskTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Signal that the task is complete. Call this as the final step once the user's request \
         has been fully satisfied, passing a concise summary of what was done as 'result'. No \
         other tool calls may accompany this one."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result": {
                    "type": "string",
                    "description": "A concise summary of the completed task"
                }
            },
            "required": ["result"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let result = args["result"].as_str().unwrap_or("").to_string();
        ToolResult::ok_with_data(
            result.clone(),
            "Task marked complete.",
            json!({"result": result}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invoke_echoes_result() {
        let tool = CompleteTaskTool::new();
        let result = tool.invoke(json!({"result": "Created /tmp/x.txt with 'hi'."})).await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["result"], "Created /tmp/x.txt with 'hi'.");
    }

    #[tokio::test]
    async fn invoke_handles_missing_result() {
        let tool = CompleteTaskTool::new();
        let result = tool.invoke(json!({})).await;
        assert!(!result.is_error());
    }
}

//! Termination protocol middleware (spec.md §4.4), grounded on
//! `original_source/nexau_harbor/complete_task_hook.py`'s
//! `CompleteTaskMiddleware`. SPEC_FULL.md §4.4 resolves Open Question (c) by
//! folding the Python source's separate immediate-stop and grace-period
//! variants into one middleware: the grace counter's whole purpose is to
//! eventually force a `complete_task` call, so the two halves share state.

use super::message::{AgentState, Message, TerminateReason};
use super::middleware::{AfterModelInput, BeforeModelInput, HookResult, Middleware};
use crate::config::TerminationConfig;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

pub const COMPLETE_TASK_TOOL_NAME: &str = "complete_task";

const GRACE_WARNING: &str = "You have stopped calling tools without finishing. You have one final \
    chance. You MUST call `complete_task` immediately with your best answer. Do not call any other \
    tools.";

/// Enforces the `complete_task` protocol: immediate stop when the terminator
/// is called (suppressing any co-called tools), a one-turn grace period when
/// the model stops producing tool calls, and `ERROR_NO_COMPLETE_TASK_CALL`
/// when the grace period is exhausted.
pub struct TerminationMiddleware {
    config: TerminationConfig,
    no_tool_call_count: AtomicU32,
    final_result: Mutex<Option<String>>,
}

impl TerminationMiddleware {
    pub fn new(config: TerminationConfig) -> Self {
        Self {
            config,
            no_tool_call_count: AtomicU32::new(0),
            final_result: Mutex::new(None),
        }
    }

    pub async fn final_result(&self) -> Option<String> {
        self.final_result.lock().await.clone()
    }
}

#[async_trait]
impl Middleware for TerminationMiddleware {
    fn name(&self) -> &str {
        "termination"
    }

    async fn before_model(&self, input: &BeforeModelInput<'_>) -> HookResult {
        // The grace turn is the turn immediately after the first no-tool-call
        // turn, i.e. when the counter currently reads 1.
        if self.no_tool_call_count.load(Ordering::SeqCst) == 1 {
            let mut messages = input.messages.clone();
            messages.push(Message::user(GRACE_WARNING));
            return HookResult::with_messages(messages);
        }
        HookResult::no_changes()
    }

    async fn after_model(&self, input: &AfterModelInput<'_>) -> HookResult {
        let tool_calls = &input.parsed_response.tool_calls;

        let complete_task_call = tool_calls.iter().find(|c| c.tool_name == COMPLETE_TASK_TOOL_NAME);

        if let Some(call) = complete_task_call {
            let result = call.parameters["result"].as_str().unwrap_or("").to_string();
            *self.final_result.lock().await = Some(result);
            self.no_tool_call_count.store(0, Ordering::SeqCst);
            input.agent_state.terminate_reason = Some(TerminateReason::Goal);

            let mut parsed = input.parsed_response.clone();
            parsed.tool_calls.clear();
            return HookResult::with_parsed_response(parsed);
        }

        if !tool_calls.is_empty() {
            self.no_tool_call_count.store(0, Ordering::SeqCst);
            return HookResult::no_changes();
        }

        let count = self.no_tool_call_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.grace_turns {
            input.agent_state.terminate_reason = Some(TerminateReason::ErrorNoCompleteTaskCall);
            HookResult::no_changes()
        } else {
            HookResult::force_continue()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{AgentState, ParsedResponse, ToolCall};
    use serde_json::json;

    #[tokio::test]
    async fn complete_task_clears_tool_calls_and_sets_goal() {
        let middleware = TerminationMiddleware::new(TerminationConfig::default());
        let mut state = AgentState::new();
        let parsed = ParsedResponse {
            text: None,
            tool_calls: vec![ToolCall {
                id: "1".into(),
                tool_name: COMPLETE_TASK_TOOL_NAME.into(),
                parameters: json!({"result": "done"}),
            }],
        };
        let input = AfterModelInput { parsed_response: parsed, agent_state: &mut state };
        let result = middleware.after_model(&input).await;

        assert!(result.parsed_response.unwrap().tool_calls.is_empty());
        assert_eq!(state.terminate_reason, Some(TerminateReason::Goal));
        assert_eq!(middleware.final_result().await, Some("done".to_string()));
    }

    #[tokio::test]
    async fn complete_task_suppresses_co_called_tools() {
        let middleware = TerminationMiddleware::new(TerminationConfig::default());
        let mut state = AgentState::new();
        let parsed = ParsedResponse {
            text: None,
            tool_calls: vec![
                ToolCall { id: "1".into(), tool_name: "read_file".into(), parameters: json!({}) },
                ToolCall { id: "2".into(), tool_name: COMPLETE_TASK_TOOL_NAME.into(), parameters: json!({"result": "x"}) },
            ],
        };
        let input = AfterModelInput { parsed_response: parsed, agent_state: &mut state };
        let result = middleware.after_model(&input).await;
        assert!(result.parsed_response.unwrap().tool_calls.is_empty());
    }

    #[tokio::test]
    async fn one_no_tool_call_turn_forces_continue() {
        let middleware = TerminationMiddleware::new(TerminationConfig::default());
        let mut state = AgentState::new();
        let input = AfterModelInput { parsed_response: ParsedResponse::default(), agent_state: &mut state };
        let result = middleware.after_model(&input).await;
        assert!(result.force_continue);
        assert_eq!(state.terminate_reason, None);
    }

    #[tokio::test]
    async fn grace_turn_injects_warning_message() {
        let middleware = TerminationMiddleware::new(TerminationConfig::default());
        let mut state = AgentState::new();
        {
            let input = AfterModelInput { parsed_response: ParsedResponse::default(), agent_state: &mut state };
            middleware.after_model(&input).await;
        }

        let input = BeforeModelInput { messages: vec![Message::user("hi")], agent_state: &mut state };
        let result = middleware.before_model(&input).await;
        let messages = result.messages.unwrap();
        assert!(messages.last().unwrap().content.as_text().contains("complete_task"));
    }

    #[tokio::test]
    async fn two_consecutive_no_tool_call_turns_terminate_with_error() {
        let middleware = TerminationMiddleware::new(TerminationConfig::default());
        let mut state = AgentState::new();
        for _ in 0..2 {
            let input = AfterModelInput { parsed_response: ParsedResponse::default(), agent_state: &mut state };
            middleware.after_model(&input).await;
        }
        assert_eq!(state.terminate_reason, Some(TerminateReason::ErrorNoCompleteTaskCall));
    }
}

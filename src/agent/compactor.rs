//! Context compactor (spec.md §4.3): token-budgeted history compression run
//! as a `before_model` middleware hook. Grounded on
//! `original_source/nexau_harbor/compact_context_hook.py`'s
//! `CompactContextMiddleware`/`AggressiveCompactContextMiddleware` pair,
//! consolidated into one middleware with a `collapse_tool_runs` flag per
//! SPEC_FULL.md §4.3's Open Question (c) resolution.

use super::message::{AgentState, Content, Message, Role};
use super::middleware::{BeforeModelInput, HookResult, Middleware};
use crate::config::CompactorConfig;
use async_trait::async_trait;

/// Pluggable token estimator (SPEC_FULL.md §4.3, Open Question (b)). The
/// default is a coarse heuristic; callers can plug an exact tokenizer.
pub trait TokenEstimator: Send + Sync {
    fn estimate_text(&self, text: &str) -> usize;

    fn estimate_message(&self, message: &Message) -> usize {
        let mut total = self.estimate_text(&message.content.as_text());
        total += 10; // role/name framing overhead
        for call in &message.tool_calls {
            total += self.estimate_text(&call.tool_name);
            total += self.estimate_text(&call.parameters.to_string());
        }
        total
    }

    fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// 4 characters per token, the gemini-cli/nexau heuristic.
#[derive(Default)]
pub struct HeuristicTokenEstimator;

impl TokenEstimator for HeuristicTokenEstimator {
    fn estimate_text(&self, text: &str) -> usize {
        text.len() / 4
    }
}

/// Optional pluggable summarizer producing a `<state_snapshot>` system
/// message from the dropped prefix (SPEC_FULL.md §4.3). No concrete
/// LLM-backed implementation ships in this crate.
#[async_trait]
pub trait SnapshotGenerator: Send + Sync {
    async fn generate(&self, dropped: &[Message]) -> crate::Result<String>;
}

fn truncate_tool_output(content: &str, budget_tokens: usize, truncate_lines: usize, estimator: &dyn TokenEstimator) -> String {
    if estimator.estimate_text(content) <= budget_tokens {
        return content.to_string();
    }

    let lines: Vec<&str> = content.split('\n').collect();
    if lines.len() > truncate_lines {
        let kept = &lines[lines.len() - truncate_lines..];
        format!(
            "[... {} lines truncated ...]\n{}",
            lines.len() - truncate_lines,
            kept.join("\n")
        )
    } else {
        let max_chars = budget_tokens * 4;
        let tail: String = content.chars().rev().take(max_chars).collect::<Vec<_>>().into_iter().rev().collect();
        format!("[... truncated to last ~{budget_tokens} tokens ...]\n{tail}")
    }
}

fn collapse_tool_runs(messages: Vec<Message>) -> Vec<Message> {
    let mut result = Vec::with_capacity(messages.len());
    let mut i = 0;
    while i < messages.len() {
        if messages[i].role == Role::Tool {
            let tool_name = messages[i].name.clone().unwrap_or_default();
            let mut j = i + 1;
            while j < messages.len()
                && messages[j].role == Role::Tool
                && messages[j].name.as_deref() == Some(tool_name.as_str())
            {
                j += 1;
            }
            let run = &messages[i..j];
            if run.len() > 2 {
                let first_preview = preview(&run[0].content.as_text(), 200);
                let last_preview = preview(&run[run.len() - 1].content.as_text(), 200);
                let summary = format!(
                    "[{} consecutive {tool_name} calls collapsed]\nFirst: {first_preview}\nLast: {last_preview}"
                );
                result.push(Message::tool_result(
                    run[run.len() - 1].tool_call_id.clone().unwrap_or_default(),
                    tool_name,
                    Content::Text(summary),
                ));
                i = j;
                continue;
            }
        }
        result.push(messages[i].clone());
        i += 1;
    }
    result
}

fn preview(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}

/// The context compactor, registered as a `before_model` middleware.
pub struct ContextCompactor {
    config: CompactorConfig,
    estimator: Box<dyn TokenEstimator>,
    snapshot_generator: Option<Box<dyn SnapshotGenerator>>,
}

impl ContextCompactor {
    pub fn new(config: CompactorConfig) -> Self {
        Self {
            config,
            estimator: Box::new(HeuristicTokenEstimator),
            snapshot_generator: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_snapshot_generator(mut self, generator: Box<dyn SnapshotGenerator>) -> Self {
        self.snapshot_generator = Some(generator);
        self
    }

    /// Run the 5-step compression pipeline (spec.md §4.3). Returns `None`
    /// when no compression is needed (below trigger threshold).
    pub async fn compress(&self, messages: &[Message]) -> Option<Vec<Message>> {
        let total_tokens = self.estimator.estimate_messages(messages);
        let threshold_tokens =
            (self.config.max_context_tokens as f32 * self.config.trigger_threshold) as usize;

        if messages.is_empty() || total_tokens < threshold_tokens {
            return None;
        }

        // 1. Partition
        let (system_messages, mut conversation): (Vec<Message>, Vec<Message>) =
            messages.iter().cloned().partition(|m| m.role == Role::System);

        if self.config.collapse_tool_runs {
            conversation = collapse_tool_runs(conversation);
        }

        // 2. Truncate tool outputs
        let truncated: Vec<Message> = conversation
            .into_iter()
            .map(|mut m| {
                if m.role == Role::Tool {
                    if let Content::Text(text) = &m.content {
                        let new_text = truncate_tool_output(
                            text,
                            self.config.tool_output_token_budget,
                            self.config.truncate_lines,
                            self.estimator.as_ref(),
                        );
                        m.content = Content::Text(new_text);
                    }
                }
                m
            })
            .collect();

        // 3. Preserve recent window (newest-to-oldest accumulation)
        let conv_tokens = self.estimator.estimate_messages(&truncated);
        let preserve_tokens = (conv_tokens as f32 * self.config.preserve_ratio) as usize;

        let mut preserved_rev: Vec<Message> = Vec::new();
        let mut preserved_tokens = 0usize;
        for message in truncated.iter().rev() {
            let message_tokens = self.estimator.estimate_message(message);
            if preserved_tokens + message_tokens <= preserve_tokens || preserved_rev.is_empty() {
                preserved_rev.push(message.clone());
                preserved_tokens += message_tokens;
            } else {
                break;
            }
        }
        preserved_rev.reverse();
        let preserved = preserved_rev;

        let dropped_count = truncated.len() - preserved.len();

        // 4. Summarize dropped prefix
        let snapshot_message = if dropped_count > 0 {
            let dropped = &truncated[..dropped_count];
            let snapshot_text = match &self.snapshot_generator {
                Some(generator) => generator.generate(dropped).await.ok(),
                None => None,
            };
            let removed_tokens = conv_tokens.saturating_sub(preserved_tokens);
            Some(Message::system(snapshot_text.unwrap_or_else(|| {
                format!(
                    "[Context compacted: {dropped_count} messages (~{removed_tokens} tokens) removed. \
                     Preserved newest {} messages.]",
                    preserved.len()
                )
            })))
        } else {
            None
        };

        // 5. Assemble
        let mut result = system_messages;
        result.extend(snapshot_message);
        result.extend(preserved);
        Some(result)
    }
}

#[async_trait]
impl Middleware for ContextCompactor {
    fn name(&self) -> &str {
        "context_compactor"
    }

    async fn before_model(&self, input: &BeforeModelInput<'_>) -> HookResult {
        match self.compress(&input.messages).await {
            Some(compacted) => {
                input.agent_state.storage.insert(
                    "compact_context_count".to_string(),
                    serde_json::json!(
                        input
                            .agent_state
                            .storage
                            .get("compact_context_count")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(0)
                            + 1
                    ),
                );
                HookResult::with_messages(compacted)
            }
            None => HookResult::no_changes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::ToolCall;

    fn big_tool_message(lines: usize) -> Message {
        let body = (0..lines).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        Message::tool_result("call-1", "run_shell_command", Content::Text(body))
    }

    #[tokio::test]
    async fn below_threshold_returns_none() {
        let compactor = ContextCompactor::new(CompactorConfig::default());
        let messages = vec![Message::user("hello")];
        assert!(compactor.compress(&messages).await.is_none());
    }

    #[tokio::test]
    async fn truncates_oversized_tool_output_to_last_lines() {
        let mut config = CompactorConfig::default();
        config.max_context_tokens = 100;
        config.trigger_threshold = 0.1;
        config.tool_output_token_budget = 5;
        config.truncate_lines = 3;
        let compactor = ContextCompactor::new(config);

        let messages = vec![Message::user("go"), big_tool_message(50)];
        let compacted = compactor.compress(&messages).await.unwrap();

        let tool_msg = compacted.iter().find(|m| m.role == Role::Tool).unwrap();
        let text = tool_msg.content.as_text();
        assert!(text.contains("lines truncated"));
        assert!(text.contains("line 49"));
    }

    #[tokio::test]
    async fn preserves_newest_message_and_system_messages() {
        let mut config = CompactorConfig::default();
        config.max_context_tokens = 40;
        config.trigger_threshold = 0.1;
        let compactor = ContextCompactor::new(config);

        let messages = vec![
            Message::system("system prompt"),
            Message::user("first request, quite long to push token count up past threshold here"),
            Message::assistant("ack", vec![]),
            Message::user("latest message"),
        ];
        let original_tokens = HeuristicTokenEstimator.estimate_messages(&messages);
        let compacted = compactor.compress(&messages).await.unwrap();
        let compacted_tokens = HeuristicTokenEstimator.estimate_messages(&compacted);

        assert!(compacted_tokens <= original_tokens);
        assert!(compacted.iter().any(|m| m.role == Role::System && m.content.as_text() == "system prompt"));
        assert_eq!(compacted.last().unwrap().content.as_text(), "latest message");
    }

    #[tokio::test]
    async fn collapses_runs_of_three_or_more_same_tool_messages() {
        let mut config = CompactorConfig::default();
        config.max_context_tokens = 40;
        config.trigger_threshold = 0.1;
        config.collapse_tool_runs = true;
        let compactor = ContextCompactor::new(config);

        let messages = vec![
            Message::user("go"),
            Message::assistant(
                "",
                vec![ToolCall { id: "1".into(), tool_name: "read_file".into(), parameters: serde_json::json!({}) }],
            ),
            Message::tool_result("1", "read_file", Content::Text("a".into())),
            Message::tool_result("2", "read_file", Content::Text("b".into())),
            Message::tool_result("3", "read_file", Content::Text("c".into())),
            Message::user("done"),
        ];
        let compacted = compactor.compress(&messages).await.unwrap();
        let collapsed = compacted.iter().find(|m| m.content.as_text().contains("collapsed"));
        assert!(collapsed.is_some());
    }
}

//! Middleware pipeline: ordered hooks around the model call and each tool
//! call (spec.md §4.2), generalized from the teacher's direct inline
//! tool-calling loop (`pawan/src/agent/mod.rs`'s `execute_with_callbacks`,
//! which had no hook points at all) into a registrable chain.

use super::message::{AgentState, Message, ParsedResponse};
use crate::tools::ToolResult;
use async_trait::async_trait;

/// Input available to a `before_model` hook.
pub struct BeforeModelInput<'a> {
    pub messages: Vec<Message>,
    pub agent_state: &'a mut AgentState,
}

/// Input available to an `after_model` hook.
pub struct AfterModelInput<'a> {
    pub parsed_response: ParsedResponse,
    pub agent_state: &'a mut AgentState,
}

/// Input available to an `after_tool` hook.
pub struct AfterToolInput<'a> {
    pub tool_name: String,
    pub tool_output: ToolResult,
    pub agent_state: &'a mut AgentState,
}

/// What a hook changed, if anything. Unset fields pass the corresponding
/// input through unmodified to the next hook in the chain.
#[derive(Debug, Default)]
pub struct HookResult {
    pub messages: Option<Vec<Message>>,
    pub parsed_response: Option<ParsedResponse>,
    pub tool_output: Option<ToolResult>,
    pub force_continue: bool,
}

impl HookResult {
    pub fn no_changes() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Some(messages),
            ..Self::default()
        }
    }

    pub fn with_parsed_response(parsed_response: ParsedResponse) -> Self {
        Self {
            parsed_response: Some(parsed_response),
            ..Self::default()
        }
    }

    pub fn force_continue() -> Self {
        Self {
            force_continue: true,
            ..Self::default()
        }
    }
}

/// A middleware exposes any subset of three hooks (spec.md §4.2). Default
/// implementations are no-ops so a middleware only needs to override the
/// hooks it cares about.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn before_model(&self, _input: &BeforeModelInput<'_>) -> HookResult {
        HookResult::no_changes()
    }

    async fn after_model(&self, _input: &AfterModelInput<'_>) -> HookResult {
        HookResult::no_changes()
    }

    async fn after_tool(&self, _input: &AfterToolInput<'_>) -> HookResult {
        HookResult::no_changes()
    }
}

/// Lets a middleware be shared (e.g. to read its state back out after the
/// loop terminates) while still living in the pipeline as a trait object.
#[async_trait]
impl<T: Middleware + ?Sized> Middleware for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn before_model(&self, input: &BeforeModelInput<'_>) -> HookResult {
        (**self).before_model(input).await
    }

    async fn after_model(&self, input: &AfterModelInput<'_>) -> HookResult {
        (**self).after_model(input).await
    }

    async fn after_tool(&self, input: &AfterToolInput<'_>) -> HookResult {
        (**self).after_tool(input).await
    }
}

/// Ordered chain of middlewares. Composition rule (spec.md §4.2): each hook
/// runs in registration order, feeding its output to the next when a field
/// was mutated; `force_continue` ORs across the whole chain at one
/// extension point.
#[derive(Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self { middlewares: Vec::new() }
    }

    pub fn register(&mut self, middleware: Box<dyn Middleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub async fn run_before_model(
        &self,
        mut messages: Vec<Message>,
        agent_state: &mut AgentState,
    ) -> (Vec<Message>, bool) {
        let mut force_continue = false;
        for mw in &self.middlewares {
            let input = BeforeModelInput {
                messages: messages.clone(),
                agent_state,
            };
            let result = mw.before_model(&input).await;
            if let Some(new_messages) = result.messages {
                messages = new_messages;
            }
            force_continue |= result.force_continue;
        }
        (messages, force_continue)
    }

    pub async fn run_after_model(
        &self,
        mut parsed_response: ParsedResponse,
        agent_state: &mut AgentState,
    ) -> (ParsedResponse, bool) {
        let mut force_continue = false;
        for mw in &self.middlewares {
            let input = AfterModelInput {
                parsed_response: parsed_response.clone(),
                agent_state,
            };
            let result = mw.after_model(&input).await;
            if let Some(new_parsed) = result.parsed_response {
                parsed_response = new_parsed;
            }
            force_continue |= result.force_continue;
        }
        (parsed_response, force_continue)
    }

    pub async fn run_after_tool(
        &self,
        tool_name: &str,
        mut tool_output: ToolResult,
        agent_state: &mut AgentState,
    ) -> ToolResult {
        for mw in &self.middlewares {
            let input = AfterToolInput {
                tool_name: tool_name.to_string(),
                tool_output: tool_output.clone(),
                agent_state,
            };
            let result = mw.after_tool(&input).await;
            if let Some(new_output) = result.tool_output {
                tool_output = new_output;
            }
        }
        tool_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::Role;

    struct TagMiddleware;

    #[async_trait]
    impl Middleware for TagMiddleware {
        fn name(&self) -> &str {
            "tag"
        }

        async fn before_model(&self, input: &BeforeModelInput<'_>) -> HookResult {
            let mut messages = input.messages.clone();
            messages.push(Message::system("tagged"));
            HookResult::with_messages(messages)
        }
    }

    struct ForceContinueMiddleware;

    #[async_trait]
    impl Middleware for ForceContinueMiddleware {
        fn name(&self) -> &str {
            "force"
        }

        async fn after_model(&self, _input: &AfterModelInput<'_>) -> HookResult {
            HookResult::force_continue()
        }
    }

    #[tokio::test]
    async fn before_model_hooks_compose_in_registration_order() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register(Box::new(TagMiddleware));
        let mut state = AgentState::new();

        let (messages, _) = pipeline.run_before_model(vec![Message::user("hi")], &mut state).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::System);
    }

    #[tokio::test]
    async fn force_continue_ors_across_middlewares() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register(Box::new(ForceContinueMiddleware));
        let mut state = AgentState::new();

        let (_, force_continue) = pipeline
            .run_after_model(ParsedResponse::default(), &mut state)
            .await;
        assert!(force_continue);
    }
}

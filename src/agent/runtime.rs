//! The agent loop (spec.md §4.1): the turn state machine tying together the
//! middleware pipeline, context compactor, termination protocol, LLM
//! provider, tool registry, and tracer. Generalized from the teacher's
//! `PawanAgent::execute_with_callbacks`, which inlined all of this as one
//! flat loop with no extension points.

use super::compactor::ContextCompactor;
use super::env_context::build_environment_context;
use super::message::{AgentState, Content, ContentPart, Message, TerminateReason};
use super::middleware::MiddlewarePipeline;
use super::provider::LlmProvider;
use super::termination::TerminationMiddleware;
use super::tracer::{InMemoryTracer, NullTracer, TraceEvent, Tracer};
use crate::config::{PawanConfig, TraceSink};
use crate::tools::{LlmContent, ToolRegistry, ToolResult};
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything the caller needs once `run()` has terminated.
#[derive(Debug)]
pub struct RunOutcome {
    pub terminate_reason: TerminateReason,
    pub final_result: Option<String>,
    pub turn_count: u32,
    pub messages: Vec<Message>,
    pub trace: serde_json::Value,
}

fn tool_output_content(result: &ToolResult) -> Content {
    match &result.llm_content {
        LlmContent::Text(text) => Content::Text(text.clone()),
        LlmContent::InlineData { mime_type, data } => Content::Parts(vec![ContentPart::InlineData {
            mime_type: mime_type.clone(),
            data_base64: data.clone(),
        }]),
    }
}

pub struct AgentLoop {
    config: PawanConfig,
    provider: Box<dyn LlmProvider>,
    tools: ToolRegistry,
    pipeline: MiddlewarePipeline,
    termination: Arc<TerminationMiddleware>,
    tracer: Box<dyn Tracer>,
    workspace_root: PathBuf,
}

impl AgentLoop {
    pub fn new(config: PawanConfig, workspace_root: PathBuf, provider: Box<dyn LlmProvider>) -> Self {
        let tools = ToolRegistry::with_defaults_filtered(
            workspace_root.clone(),
            config.dry_run,
            config.memory_file_path(),
            config.enabled_tools.as_deref(),
        );

        let termination = Arc::new(TerminationMiddleware::new(config.termination.clone()));
        let compactor = ContextCompactor::new(config.compactor.clone());

        let mut pipeline = MiddlewarePipeline::new();
        pipeline.register(Box::new(compactor));
        pipeline.register(Box::new(Arc::clone(&termination)));

        let tracer: Box<dyn Tracer> = match config.trace_sink {
            TraceSink::Memory => Box::new(InMemoryTracer::new()),
            TraceSink::None => Box::new(NullTracer),
        };

        Self {
            config,
            provider,
            tools,
            pipeline,
            termination,
            tracer,
            workspace_root,
        }
    }

    /// Run one `run()` call to completion (spec.md §4.1's 7-step state
    /// machine), returning once `terminate_reason` is set.
    pub async fn run(&self, query: &str) -> Result<RunOutcome> {
        let mut state = AgentState::new();
        state.messages.push(Message::user(query));

        let started_at = Instant::now();
        let timeout = self.config.run_timeout_secs.map(Duration::from_secs);

        loop {
            state.turn_count += 1;
            self.tracer.emit(TraceEvent::TurnStarted { turn: state.turn_count });

            if let Some(timeout) = timeout {
                if started_at.elapsed() >= timeout {
                    state.terminate_reason = Some(TerminateReason::Timeout);
                    break;
                }
            }

            // 1. PrepareMessages
            let mut full_messages = vec![Message::system(self.config.get_system_prompt())];
            if self.config.inject_environment_context && state.turn_count == 1 {
                let tmp_dir = std::env::temp_dir().join(format!("pawan-{}", uuid::Uuid::new_v4()));
                full_messages.push(Message::system(build_environment_context(
                    &self.config.agent_name,
                    &self.workspace_root,
                    &tmp_dir,
                )));
            }
            full_messages.extend(state.messages.clone());

            // 2. BeforeModel
            let (prepared_messages, force_continue_before) =
                self.pipeline.run_before_model(full_messages, &mut state).await;

            // 3. Invoke
            self.tracer.emit(TraceEvent::ModelCalled {
                turn: state.turn_count,
                message_count: prepared_messages.len(),
            });
            let parsed = self
                .provider
                .chat(&prepared_messages, &self.tools.get_definitions())
                .await;
            let parsed = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    state.terminate_reason = Some(TerminateReason::Error);
                    self.tracer.emit(TraceEvent::Terminated {
                        turn: state.turn_count,
                        reason: format!("ERROR: {e}"),
                    });
                    return Err(e);
                }
            };

            // 4. AfterModel
            let (parsed, force_continue_after) = self.pipeline.run_after_model(parsed, &mut state).await;
            let force_continue = force_continue_before || force_continue_after;

            // 5. Append assistant message
            state
                .messages
                .push(Message::assistant(parsed.text.clone().unwrap_or_default(), parsed.tool_calls.clone()));

            // 6. Dispatch tools, in order
            for call in &parsed.tool_calls {
                self.tracer.emit(TraceEvent::ToolCalled {
                    turn: state.turn_count,
                    tool_name: call.tool_name.clone(),
                    parameters: call.parameters.clone(),
                });

                let result = self.tools.execute(&call.tool_name, call.parameters.clone()).await;
                let result = self
                    .pipeline
                    .run_after_tool(&call.tool_name, result, &mut state)
                    .await;

                self.tracer.emit(TraceEvent::ToolResult {
                    turn: state.turn_count,
                    tool_name: call.tool_name.clone(),
                    is_error: result.is_error(),
                });

                state.messages.push(Message::tool_result(
                    call.id.clone(),
                    call.tool_name.clone(),
                    tool_output_content(&result),
                ));
            }

            // 7. Terminate?
            if state.terminate_reason.is_none() && parsed.tool_calls.is_empty() && !force_continue {
                state.terminate_reason = Some(TerminateReason::ErrorNoCompleteTaskCall);
            }
            if state.terminate_reason.is_none() && state.turn_count >= self.config.max_turns {
                state.terminate_reason = Some(TerminateReason::MaxTurns);
            }

            if state.terminate_reason.is_some() {
                break;
            }
        }

        let terminate_reason = state.terminate_reason.unwrap_or(TerminateReason::Error);
        self.tracer.emit(TraceEvent::Terminated {
            turn: state.turn_count,
            reason: format!("{terminate_reason:?}"),
        });

        let final_result = self.termination.final_result().await;
        let trace = self.tracer.dump();

        Ok(RunOutcome {
            terminate_reason,
            final_result,
            turn_count: state.turn_count,
            messages: state.messages,
            trace,
        })
    }
}

//! # Pawan (पवन) - coding agent runtime
//!
//! Pawan drives an LLM through a sequence of tool invocations to accomplish
//! software-engineering tasks in a local workspace. It provides:
//!
//! - An **agent loop**: prepare messages, call the model, dispatch tool calls, repeat.
//! - A **middleware pipeline** around the model call and each tool call.
//! - A **context compactor** that keeps the conversation within a token budget.
//! - A **termination protocol** that coerces the model into calling `complete_task`.
//! - A **tool catalog**: file I/O, shell execution, search, web access, memory, todos.
//!
//! ## Quick start
//!
//! ```bash
//! pawan run --config-path pawan.toml --query "add input validation to CreateAgentRequest" --log-dir-path ./logs
//! ```

pub mod agent;
pub mod config;
pub mod tools;

pub use agent::AgentLoop;
pub use config::PawanConfig;

/// Error types for Pawan's internal (non-wire) error handling.
///
/// This is distinct from [`tools::ToolErrorType`]: `PawanError` is the
/// implementation-layer error propagated with `?` inside tool bodies and
/// middleware; `ToolErrorType` is the closed, wire-facing taxonomy the model
/// sees once a `PawanError` has been caught and converted into a `ToolResult`.
#[derive(Debug, thiserror::Error)]
pub enum PawanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool execution error: {0}")]
    Tool(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),
}

/// Result type alias for Pawan operations
pub type Result<T> = std::result::Result<T, PawanError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default model for coding tasks
pub const DEFAULT_MODEL: &str = "nemotron";

/// Default maximum number of turns in one `run()` call before `MAX_TURNS` termination.
pub const DEFAULT_MAX_TURNS: u32 = 50;

/// Default timeout for shell commands (milliseconds). 0 means no timeout.
pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 300_000;

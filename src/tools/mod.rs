//! Tool catalog: the 13 tools of spec.md §4.5 behind a uniform [`Tool`] trait.
//!
//! Generalized from `pawan`'s original `Tool`/`ToolRegistry` (which covered
//! 11 file/search/bash/git tools with no wire-result shape — `execute`
//! returned a bare `crate::Result<Value>`). This version separates the
//! *implementation* error (`crate::PawanError`, propagated with `?` inside a
//! tool body) from the *wire* error taxonomy (`ToolErrorType`, returned to the
//! model): every `Tool::invoke` is total and never lets a Rust error escape,
//! per spec.md §7's propagation policy.

pub mod ask_user;
pub mod bash;
pub mod complete_task;
pub mod edit;
pub mod file;
pub mod list_directory;
pub mod memory;
pub mod search;
pub mod todos;
pub mod web;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The closed, per-tool wire error taxonomy (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolErrorType {
    // Input
    #[serde(rename = "INVALID_COMMAND")]
    InvalidCommand,
    #[serde(rename = "INVALID_PATTERN")]
    InvalidPattern,
    #[serde(rename = "INVALID_URL")]
    InvalidUrl,
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "INVALID_PARAMETER")]
    InvalidParameter,
    #[serde(rename = "NO_URLS_FOUND")]
    NoUrlsFound,
    #[serde(rename = "TOO_MANY_URLS")]
    TooManyUrls,
    #[serde(rename = "MISSING_DESCRIPTION")]
    MissingDescription,
    #[serde(rename = "INVALID_STATUS")]
    InvalidStatus,
    #[serde(rename = "MULTIPLE_IN_PROGRESS")]
    MultipleInProgress,
    // Filesystem
    #[serde(rename = "FILE_NOT_FOUND")]
    FileNotFound,
    #[serde(rename = "PATH_IS_DIRECTORY")]
    PathIsDirectory,
    #[serde(rename = "NOT_A_DIRECTORY")]
    NotADirectory,
    #[serde(rename = "TARGET_IS_DIRECTORY")]
    TargetIsDirectory,
    #[serde(rename = "DIRECTORY_NOT_FOUND")]
    DirectoryNotFound,
    #[serde(rename = "PERMISSION_DENIED")]
    PermissionDenied,
    #[serde(rename = "FILE_TOO_LARGE")]
    FileTooLarge,
    #[serde(rename = "NO_SPACE_LEFT")]
    NoSpaceLeft,
    // Edit
    #[serde(rename = "EDIT_NO_CHANGE")]
    EditNoChange,
    #[serde(rename = "EDIT_NO_OCCURRENCE_FOUND")]
    EditNoOccurrenceFound,
    #[serde(rename = "EDIT_OCCURRENCE_MISMATCH")]
    EditOccurrenceMismatch,
    #[serde(rename = "ATTEMPT_TO_CREATE_EXISTING_FILE")]
    AttemptToCreateExistingFile,
    // Execution
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "SHELL_NOT_FOUND")]
    ShellNotFound,
    #[serde(rename = "EXECUTION_ERROR")]
    ExecutionError,
    #[serde(rename = "SHELL_EXECUTE_ERROR")]
    ShellExecuteError,
    // Network
    #[serde(rename = "WEB_SEARCH_NOT_CONFIGURED")]
    WebSearchNotConfigured,
    #[serde(rename = "WEB_SEARCH_FAILED")]
    WebSearchFailed,
    #[serde(rename = "FETCH_ERROR")]
    FetchError,
}

/// `llm_content` of a `ToolResult`: either plain text or an inline-data part
/// (images/audio/PDF read through `read_file`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LlmContent {
    Text(String),
    InlineData { mime_type: String, data: String },
}

impl From<String> for LlmContent {
    fn from(s: String) -> Self {
        LlmContent::Text(s)
    }
}

impl From<&str> for LlmContent {
    fn from(s: &str) -> Self {
        LlmContent::Text(s.to_string())
    }
}

/// A tool's structured error: `{message, type}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ToolErrorType,
}

/// The result of invoking one tool (spec.md §3): `{llm_content, return_display, error?, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub llm_content: LlmContent,
    pub return_display: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(llm_content: impl Into<LlmContent>, return_display: impl Into<String>) -> Self {
        Self {
            llm_content: llm_content.into(),
            return_display: return_display.into(),
            error: None,
            data: None,
        }
    }

    pub fn ok_with_data(
        llm_content: impl Into<LlmContent>,
        return_display: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            llm_content: llm_content.into(),
            return_display: return_display.into(),
            error: None,
            data: Some(data),
        }
    }

    pub fn err(message: impl Into<String>, error_type: ToolErrorType) -> Self {
        let message = message.into();
        Self {
            llm_content: LlmContent::Text(message.clone()),
            return_display: message.clone(),
            error: Some(ToolError { message, error_type }),
            data: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Tool definition surfaced to the LLM provider as part of its schema catalog.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A tool: `{name, schema, invoke(parameters) -> ToolResult}` (spec.md §4.5).
///
/// `invoke` is total: implementations catch their own internal errors and
/// return a `ToolResult` with `.error` set rather than propagating.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn invoke(&self, parameters: Value) -> ToolResult;

    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Registry mapping tool name to implementation.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Build a registry with all 13 tools of spec.md §4.5 registered,
    /// optionally restricted to `enabled` (by name).
    pub fn with_defaults(workspace_root: PathBuf, dry_run: bool) -> Self {
        Self::with_defaults_filtered(
            workspace_root,
            dry_run,
            crate::config::PawanConfig::default().memory_file_path(),
            None,
        )
    }

    pub fn with_defaults_filtered(
        workspace_root: PathBuf,
        dry_run: bool,
        memory_file_path: PathBuf,
        enabled: Option<&[String]>,
    ) -> Self {
        let mut registry = Self::new();

        registry.register(Arc::new(file::ReadFileTool::new(workspace_root.clone())));
        registry.register(Arc::new(file::WriteFileTool::new(
            workspace_root.clone(),
            dry_run,
        )));
        registry.register(Arc::new(list_directory::ListDirectoryTool::new(
            workspace_root.clone(),
        )));
        registry.register(Arc::new(list_directory::ReadManyFilesTool::new(
            workspace_root.clone(),
        )));
        registry.register(Arc::new(edit::EditFileTool::new(
            workspace_root.clone(),
            dry_run,
        )));
        registry.register(Arc::new(search::GlobSearchTool::new(workspace_root.clone())));
        registry.register(Arc::new(search::GrepSearchTool::new(workspace_root.clone())));
        registry.register(Arc::new(bash::BashTool::new(workspace_root.clone(), dry_run)));
        registry.register(Arc::new(memory::SaveMemoryTool::new(memory_file_path)));
        registry.register(Arc::new(todos::WriteTodosTool::new()));
        registry.register(Arc::new(ask_user::AskUserTool::new()));
        registry.register(Arc::new(web::WebFetchTool::new()));
        registry.register(Arc::new(web::WebSearchTool::new()));
        registry.register(Arc::new(complete_task::CompleteTaskTool::new()));

        if let Some(enabled) = enabled {
            let allow: std::collections::HashSet<&str> = enabled.iter().map(|s| s.as_str()).collect();
            registry.tools.retain(|name, _| allow.contains(name.as_str()));
        }

        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool by name. Unknown tool names are themselves reported as
    /// a `ToolResult` error rather than a Rust-level `Err`, keeping the
    /// boundary total per spec.md §7.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => ToolResult::err(
                format!("Unknown tool: {name}"),
                ToolErrorType::InvalidCommand,
            ),
        }
    }

    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

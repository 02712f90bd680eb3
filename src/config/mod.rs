//! Configuration for Pawan
//!
//! Loaded from a TOML file via `PawanConfig::load`, with `#[serde(default)]`
//! filling in anything the caller's file omits.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// LLM provider selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    OpenAI,
}

/// Configuration for the context compactor (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactorConfig {
    /// Maximum context window, in estimated tokens.
    pub max_context_tokens: usize,
    /// Fraction of `max_context_tokens` that triggers compaction.
    pub trigger_threshold: f32,
    /// Per tool-output token budget before truncation kicks in.
    pub tool_output_token_budget: usize,
    /// Number of trailing lines kept when truncating an oversized tool output.
    pub truncate_lines: usize,
    /// Fraction of conversational tokens preserved as the "kept tail".
    pub preserve_ratio: f32,
    /// Collapse runs of >=3 consecutive same-tool messages (aggressive variant).
    pub collapse_tool_runs: bool,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            trigger_threshold: 0.5,
            tool_output_token_budget: 50_000,
            truncate_lines: 30,
            preserve_ratio: 0.3,
            collapse_tool_runs: false,
        }
    }
}

/// Configuration for the termination protocol middleware (spec.md §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationConfig {
    /// Number of consecutive no-tool-call turns granted before
    /// `ERROR_NO_COMPLETE_TASK_CALL`. Spec.md fixes this at 2 (one grace turn);
    /// kept configurable for callers who want a longer/shorter leash.
    pub grace_turns: u32,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        Self { grace_turns: 2 }
    }
}

/// Which trace sink to wire up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceSink {
    #[default]
    Memory,
    None,
}

/// Main configuration for Pawan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PawanConfig {
    /// LLM provider to use.
    pub provider: LlmProvider,
    /// LLM model to use.
    pub model: String,
    /// Ollama base URL (ignored for other providers).
    pub ollama_url: String,
    /// Enable dry-run mode: mutating tools log their would-be action and
    /// return success without touching the filesystem.
    pub dry_run: bool,
    /// Temperature for LLM sampling.
    pub temperature: f32,
    /// Top-p sampling parameter.
    pub top_p: f32,
    /// Maximum tokens in one model response.
    pub max_tokens: usize,
    /// System prompt override.
    pub system_prompt: Option<String>,
    /// Maximum turns in one `run()` call. Accepts the teacher's historical
    /// field name as an alias so old `pawan.toml` files keep working.
    #[serde(alias = "max_tool_iterations")]
    pub max_turns: u32,
    /// Optional wall-clock timeout for the whole run, in seconds.
    pub run_timeout_secs: Option<u64>,
    /// Tool names to enable; `None` means all tools in `ToolRegistry::with_defaults`.
    pub enabled_tools: Option<Vec<String>>,
    /// Name the agent refers to itself as in prompts and the memory file path.
    pub agent_name: String,
    /// Filename of the long-term memory file, under `<home>/.<agent_name lowercased>/`.
    pub memory_file_name: String,
    /// Override the memory file's full path (takes precedence over `agent_name`/`memory_file_name`).
    pub memory_file_path: Option<PathBuf>,
    /// Inject the one-shot environment-context message on the first turn.
    ///
    /// Resolves Open Question (a): the teacher's source carried two CLI
    /// module variants, one injecting this context and one not, with no
    /// documented reason to prefer either. Exposed as a config toggle instead
    /// of silently picking one.
    pub inject_environment_context: bool,
    /// Context compactor parameters.
    pub compactor: CompactorConfig,
    /// Termination protocol parameters.
    pub termination: TerminationConfig,
    /// Trace sink selection.
    pub trace_sink: TraceSink,
}

impl Default for PawanConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: crate::DEFAULT_MODEL.to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            dry_run: false,
            temperature: 1.0,
            top_p: 0.95,
            max_tokens: 8192,
            system_prompt: None,
            max_turns: crate::DEFAULT_MAX_TURNS,
            run_timeout_secs: None,
            enabled_tools: None,
            agent_name: "Pawan".to_string(),
            memory_file_name: "PAWAN.md".to_string(),
            memory_file_path: None,
            inject_environment_context: true,
            compactor: CompactorConfig::default(),
            termination: TerminationConfig::default(),
            trace_sink: TraceSink::default(),
        }
    }
}

impl PawanConfig {
    /// Load configuration from a TOML file, or fall back to defaults when
    /// `path` is `None` and no `pawan.toml` exists in the current directory.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            let pawan_toml = PathBuf::from("pawan.toml");
            pawan_toml.exists().then_some(pawan_toml)
        });

        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    crate::PawanError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                toml::from_str(&content).map_err(|e| {
                    crate::PawanError::Config(format!("Failed to parse {}: {}", path.display(), e))
                })
            }
            None => Ok(Self::default()),
        }
    }

    /// Resolve the path to the long-term memory file.
    pub fn memory_file_path(&self) -> PathBuf {
        if let Some(p) = &self.memory_file_path {
            return p.clone();
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(format!(".{}", self.agent_name.to_lowercase()))
            .join(&self.memory_file_name)
    }

    /// Get the system prompt, falling back to the built-in default.
    pub fn get_system_prompt(&self) -> String {
        self.system_prompt
            .clone()
            .unwrap_or_else(|| default_system_prompt(&self.agent_name))
    }
}

fn default_system_prompt(agent_name: &str) -> String {
    format!(
        "You are {agent_name}, an expert coding assistant operating in a local workspace. \
         You accomplish tasks by calling tools: reading and writing files, making targeted \
         edits, running shell commands, searching code, managing a todo list, and fetching \
         web pages. When a task is complete, call `complete_task` with a summary of what you \
         did; do not stop producing tool calls without calling it."
    )
}

/// Canonical header for the memory-file section Pawan writes facts under.
pub const MEMORY_SECTION_HEADER: &str = "## Gemini Added Memories";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = PawanConfig::default();
        assert_eq!(config.max_turns, 50);
        assert!(config.inject_environment_context);
        assert_eq!(config.compactor.trigger_threshold, 0.5);
        assert_eq!(config.termination.grace_turns, 2);
    }

    #[test]
    fn load_from_toml_with_legacy_alias() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("pawan.toml");
        std::fs::write(
            &config_path,
            r#"
model = "llama3.2"
dry_run = true
max_tool_iterations = 100

[compactor]
max_context_tokens = 4000
"#,
        )
        .unwrap();

        let config = PawanConfig::load(Some(&config_path)).unwrap();
        assert_eq!(config.model, "llama3.2");
        assert!(config.dry_run);
        assert_eq!(config.max_turns, 100);
        assert_eq!(config.compactor.max_context_tokens, 4000);
    }

    #[test]
    fn memory_path_respects_override() {
        let mut config = PawanConfig::default();
        config.memory_file_path = Some(PathBuf::from("/tmp/explicit.md"));
        assert_eq!(config.memory_file_path(), PathBuf::from("/tmp/explicit.md"));
    }
}

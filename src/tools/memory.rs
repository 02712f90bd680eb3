//! `save_memory` — appends a fact to the long-term memory file under a
//! canonical markdown section header (spec.md §4.5.9).

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::config::MEMORY_SECTION_HEADER;

fn ensure_newline_separation(content: &str) -> &'static str {
    if content.is_empty() {
        ""
    } else if content.ends_with("\n\n") || content.ends_with("\r\n\r\n") {
        ""
    } else if content.ends_with('\n') || content.ends_with("\r\n") {
        "\n"
    } else {
        "\n\n"
    }
}

fn compute_new_content(current_content: &str, fact: &str) -> String {
    let processed_fact = fact.trim().trim_start_matches('-').trim();
    let new_item = format!("- {processed_fact}");

    match current_content.find(MEMORY_SECTION_HEADER) {
        None => {
            let separator = ensure_newline_separation(current_content);
            format!("{current_content}{separator}{MEMORY_SECTION_HEADER}\n{new_item}\n")
        }
        Some(header_index) => {
            let start_of_section = header_index + MEMORY_SECTION_HEADER.len();
            let end_of_section = current_content[start_of_section..]
                .find("\n## ")
                .map(|offset| start_of_section + offset)
                .unwrap_or(current_content.len());

            let before_section = current_content[..start_of_section].trim_end();
            let section_content = current_content[start_of_section..end_of_section].trim();
            let after_section = &current_content[end_of_section..];

            let new_section_content = if section_content.is_empty() {
                new_item
            } else {
                format!("{section_content}\n{new_item}")
            };

            format!("{before_section}\n{new_section_content}\n{after_section}")
                .trim_end()
                .to_string()
                + "\n"
        }
    }
}

pub struct SaveMemoryTool {
    memory_file_path: PathBuf,
}

impl SaveMemoryTool {
    pub fn new(memory_file_path: PathBuf) -> Self {
        Self { memory_file_path }
    }
}

#[async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Save a specific piece of information to long-term memory. Use when the user \
         explicitly asks to remember something, or states a clear, important fact worth \
         retaining across sessions."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "fact": {"type": "string", "description": "The fact or information to remember"}
            },
            "required": ["fact"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let fact = match args["fact"].as_str() {
            Some(f) if !f.trim().is_empty() => f,
            _ => return ToolResult::err("Fact cannot be empty.", ToolErrorType::InvalidInput),
        };

        let current_content = tokio::fs::read_to_string(&self.memory_file_path)
            .await
            .unwrap_or_default();
        let new_content = compute_new_content(&current_content, fact);

        if let Some(parent) = self.memory_file_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::err(
                    format!("Failed to write memory file: {e}"),
                    ToolErrorType::ExecutionError,
                );
            }
        }
        if let Err(e) = tokio::fs::write(&self.memory_file_path, &new_content).await {
            return ToolResult::err(
                format!("Failed to write memory file: {e}"),
                ToolErrorType::ExecutionError,
            );
        }

        ToolResult::ok_with_data(
            format!("Okay, I've remembered that: \"{fact}\""),
            "Memory saved.",
            json!({"success": true, "memory_file": self.memory_file_path.display().to_string()}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn creates_header_and_entry_on_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MEMORY.md");
        let tool = SaveMemoryTool::new(path.clone());
        let result = tool.invoke(json!({"fact": "the user prefers tabs"})).await;
        assert!(!result.is_error());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(MEMORY_SECTION_HEADER));
        assert!(content.contains("- the user prefers tabs"));
    }

    #[tokio::test]
    async fn appends_to_existing_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MEMORY.md");
        std::fs::write(&path, format!("{MEMORY_SECTION_HEADER}\n- first fact\n")).unwrap();

        let tool = SaveMemoryTool::new(path.clone());
        let result = tool.invoke(json!({"fact": "second fact"})).await;
        assert!(!result.is_error());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("- first fact"));
        assert!(content.contains("- second fact"));
        // only one header
        assert_eq!(content.matches(MEMORY_SECTION_HEADER).count(), 1);
    }

    #[tokio::test]
    async fn strips_leading_dash_from_fact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MEMORY.md");
        let tool = SaveMemoryTool::new(path.clone());
        let result = tool.invoke(json!({"fact": "- already dashed"})).await;
        assert!(!result.is_error());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("- already dashed"));
        assert!(!content.contains("- - already dashed"));
    }

    #[tokio::test]
    async fn empty_fact_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MEMORY.md");
        let tool = SaveMemoryTool::new(path);
        let result = tool.invoke(json!({"fact": "   "})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidInput);
    }

    #[tokio::test]
    async fn preserves_content_after_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("MEMORY.md");
        std::fs::write(
            &path,
            format!("{MEMORY_SECTION_HEADER}\n- first\n\n## Other Section\nkeep me\n"),
        )
        .unwrap();

        let tool = SaveMemoryTool::new(path.clone());
        let result = tool.invoke(json!({"fact": "second"})).await;
        assert!(!result.is_error());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Other Section"));
        assert!(content.contains("keep me"));
        assert!(content.contains("- second"));
    }
}

//! `replace` — text replacement with three escalating matching strategies
//! (spec.md §4.5.3).

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use std::path::PathBuf;

const DELIMITERS: [char; 10] = ['(', ')', ':', '[', ']', '{', '}', '>', '<', '='];

fn restore_trailing_newline(original: &str, modified: &str) -> String {
    let had_trailing = original.ends_with('\n');
    let has_trailing = modified.ends_with('\n');
    if had_trailing && !has_trailing {
        format!("{modified}\n")
    } else if !had_trailing && has_trailing {
        modified.trim_end_matches('\n').to_string()
    } else {
        modified.to_string()
    }
}

/// Strategy 1: literal substring match, case- and whitespace-sensitive.
fn exact_replacement(content: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let occurrences = content.matches(old).count();
    if occurrences == 0 {
        return None;
    }
    let modified = content.replacen(old, new, occurrences);
    Some((restore_trailing_newline(content, &modified), occurrences))
}

/// Strategy 2: match a line window where every line's trimmed text agrees,
/// ignoring indentation; re-indent the replacement from the first matched line.
fn flexible_replacement(content: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let mut source_lines: Vec<String> = content.split('\n').map(String::from).collect();
    let search_stripped: Vec<&str> = old.split('\n').map(str::trim).collect();
    let replace_lines: Vec<&str> = new.split('\n').collect();

    if search_stripped.is_empty() || source_lines.len() < search_stripped.len() {
        return None;
    }

    let mut occurrences = 0;
    let mut i = 0;
    while i + search_stripped.len() <= source_lines.len() {
        let window_stripped: Vec<&str> =
            source_lines[i..i + search_stripped.len()].iter().map(|l| l.trim()).collect();
        if window_stripped == search_stripped {
            occurrences += 1;
            let indentation: String = source_lines[i]
                .chars()
                .take_while(|c| c.is_whitespace())
                .collect();
            let new_block: Vec<String> =
                replace_lines.iter().map(|line| format!("{indentation}{line}")).collect();
            let new_len = new_block.len();
            source_lines.splice(i..i + search_stripped.len(), new_block);
            i += new_len;
        } else {
            i += 1;
        }
    }

    if occurrences > 0 {
        let modified = source_lines.join("\n");
        Some((restore_trailing_newline(content, &modified), occurrences))
    } else {
        None
    }
}

/// Strategy 3: tokenize `old` on the delimiter set, rebuild as a `\s*`-joined
/// regex over escaped tokens, anchored to line-leading whitespace so the
/// captured indentation can be reapplied to `new`.
fn regex_replacement(content: &str, old: &str, new: &str) -> Option<(String, usize)> {
    let mut processed = old.to_string();
    for delim in DELIMITERS {
        processed = processed.replace(delim, &format!(" {delim} "));
    }
    let tokens: Vec<&str> = processed.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let escaped: Vec<String> = tokens.iter().map(|t| regex::escape(t)).collect();
    let pattern_body = escaped.join(r"\s*");
    let pattern = format!(r"(?m)^([ \t]*){pattern_body}");

    let regex: Regex = RegexBuilder::new(&pattern).build().ok()?;
    let m = regex.find(content)?;
    let captures = regex.captures(content)?;
    let indentation = captures.get(1).map(|g| g.as_str()).unwrap_or("");

    let new_block: String = new
        .split('\n')
        .map(|line| format!("{indentation}{line}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut modified = String::with_capacity(content.len());
    modified.push_str(&content[..m.start()]);
    modified.push_str(&new_block);
    modified.push_str(&content[m.end()..]);

    Some((restore_trailing_newline(content, &modified), 1))
}

/// Applies `replace` with the three-strategy cascade, returning the new
/// content, the occurrence count, and which strategy matched.
fn apply_replacement(content: &str, old: &str, new: &str) -> Option<(String, usize, &'static str)> {
    if let Some((modified, n)) = exact_replacement(content, old, new) {
        return Some((modified, n, "exact"));
    }
    if let Some((modified, n)) = flexible_replacement(content, old, new) {
        return Some((modified, n, "flexible"));
    }
    if let Some((modified, n)) = regex_replacement(content, old, new) {
        return Some((modified, n, "regex"));
    }
    None
}

fn generate_diff(original: &str, modified: &str, file_path: &str) -> String {
    let diff = similar::TextDiff::from_lines(original, modified);
    diff.unified_diff()
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string()
}

pub struct EditFileTool {
    workspace_root: PathBuf,
    dry_run: bool,
}

impl EditFileTool {
    pub fn new(workspace_root: PathBuf, dry_run: bool) -> Self {
        Self { workspace_root, dry_run }
    }
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        "replace"
    }

    fn description(&self) -> &str {
        "Replace text within a file. Tries an exact match first, then a whitespace-flexible \
         line-window match, then a delimiter-tokenized regex match. Pass an empty old_string \
         to create a new file."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {"type": "string"},
                "instruction": {"type": "string", "description": "What the change accomplishes"},
                "old_string": {"type": "string", "description": "Exact literal text to replace; empty to create a new file"},
                "new_string": {"type": "string", "description": "Replacement text"},
                "expected_replacements": {"type": "integer", "description": "Number of occurrences expected (default 1)"}
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let file_path = match args["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::err("file_path is required", ToolErrorType::InvalidParameter),
        };
        let old_string = args["old_string"].as_str().unwrap_or("");
        let new_string = match args["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::err("new_string is required", ToolErrorType::InvalidParameter),
        };
        let expected = args["expected_replacements"].as_u64().map(|v| v as usize).unwrap_or(1);

        if old_string == new_string {
            return ToolResult::err(
                "No changes to apply. old_string and new_string are identical.",
                ToolErrorType::EditNoChange,
            );
        }

        let full_path = if PathBuf::from(file_path).is_absolute() {
            PathBuf::from(file_path)
        } else {
            self.workspace_root.join(file_path)
        };

        let is_new_file = old_string.is_empty() && !full_path.exists();

        if is_new_file {
            if self.dry_run {
                return ToolResult::ok_with_data(
                    format!("[dry run] Would create {file_path}"),
                    format!("[dry run] Would create {file_path}"),
                    json!({"success": true, "operation": "create", "dry_run": true}),
                );
            }
            if let Some(parent) = full_path.parent() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return ToolResult::err(
                        format!("Failed to create parent directories: {e}"),
                        ToolErrorType::ExecutionError,
                    );
                }
            }
            if let Err(e) = tokio::fs::write(&full_path, new_string).await {
                return ToolResult::err(
                    format!("Error creating {file_path}: {e}"),
                    ToolErrorType::ExecutionError,
                );
            }
            return ToolResult::ok_with_data(
                format!("Created new file: {file_path} with provided content."),
                format!("Created: {file_path}"),
                json!({
                    "success": true,
                    "operation": "create",
                    "num_lines": new_string.lines().count(),
                }),
            );
        }

        if !full_path.exists() {
            return ToolResult::err(
                format!("File not found: {file_path}"),
                ToolErrorType::FileNotFound,
            );
        }

        if old_string.is_empty() {
            return ToolResult::err(
                format!(
                    "File already exists, cannot create: {file_path}. Use non-empty old_string to edit."
                ),
                ToolErrorType::AttemptToCreateExistingFile,
            );
        }

        let bytes = match tokio::fs::read(&full_path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolResult::err(
                    format!("Permission denied: {file_path}"),
                    ToolErrorType::PermissionDenied,
                )
            }
            Err(e) => {
                return ToolResult::err(
                    format!("Error reading {file_path}: {e}"),
                    ToolErrorType::ExecutionError,
                )
            }
        };
        let current_content = match String::from_utf8(bytes.clone()) {
            Ok(s) => s,
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        };

        let had_crlf = current_content.contains("\r\n");
        let normalized_content = current_content.replace("\r\n", "\n");
        let normalized_old = old_string.replace("\r\n", "\n");
        let normalized_new = new_string.replace("\r\n", "\n");

        let Some((mut new_content, occurrences, strategy)) =
            apply_replacement(&normalized_content, &normalized_old, &normalized_new)
        else {
            return ToolResult::err(
                format!(
                    "Failed to edit, 0 occurrences found for old_string in {file_path}. Ensure \
                     you're not escaping content incorrectly and check whitespace, indentation, \
                     and context. Use read_file to verify."
                ),
                ToolErrorType::EditNoOccurrenceFound,
            );
        };

        if occurrences != expected {
            return ToolResult::err(
                format!("Expected {expected} occurrence(s) but found {occurrences}."),
                ToolErrorType::EditOccurrenceMismatch,
            );
        }

        if had_crlf {
            new_content = new_content.replace('\n', "\r\n");
        }

        if self.dry_run {
            return ToolResult::ok_with_data(
                format!("[dry run] Would modify {file_path} ({occurrences} replacement(s))"),
                format!("[dry run] {file_path}"),
                json!({"success": true, "operation": "update", "strategy": strategy, "dry_run": true}),
            );
        }

        if let Err(e) = tokio::fs::write(&full_path, &new_content).await {
            return ToolResult::err(
                format!("Error writing {file_path}: {e}"),
                ToolErrorType::ExecutionError,
            );
        }

        let diff = generate_diff(&current_content, &new_content, file_path);

        ToolResult::ok_with_data(
            format!("Successfully modified file: {file_path} ({occurrences} replacement(s))."),
            format!("{file_path}: {occurrences} replacement(s) via {strategy} match"),
            json!({
                "success": true,
                "operation": "update",
                "occurrences": occurrences,
                "strategy": strategy,
                "num_lines": new_content.lines().count(),
                "diff": diff,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn exact_strategy_replaces_literal_text() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn foo() {\n    1\n}\n").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "a.rs", "old_string": "    1\n", "new_string": "    2\n"}))
            .await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["strategy"], "exact");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.rs")).unwrap(), "fn foo() {\n    2\n}\n");
    }

    #[tokio::test]
    async fn flexible_strategy_ignores_indentation_and_reindents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n        return 1\n").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "a.py", "old_string": "return 1", "new_string": "return 2"}))
            .await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["strategy"], "flexible");
        let content = std::fs::read_to_string(dir.path().join("a.py")).unwrap();
        assert!(content.contains("        return 2"));
    }

    #[tokio::test]
    async fn regex_strategy_matches_across_reformatted_delimiters() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn foo(a: i32, b: i32) -> i32 {\n    a + b\n}\n").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({
                "file_path": "a.rs",
                "old_string": "fn foo(a:i32,b:i32)->i32{",
                "new_string": "fn foo(a: i64, b: i64) -> i64 {"
            }))
            .await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["strategy"], "regex");
    }

    #[tokio::test]
    async fn no_match_reports_no_occurrence_found() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "a.txt", "old_string": "nonexistent", "new_string": "x"}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::EditNoOccurrenceFound);
    }

    #[tokio::test]
    async fn occurrence_mismatch_reports_count() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo foo foo").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "a.txt", "old_string": "foo", "new_string": "bar"}))
            .await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::EditOccurrenceMismatch);
    }

    #[tokio::test]
    async fn empty_old_string_creates_new_file() {
        let dir = TempDir::new().unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "new.txt", "old_string": "", "new_string": "content"}))
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.path().join("new.txt")).unwrap(), "content");
    }

    #[tokio::test]
    async fn empty_old_string_on_existing_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("exists.txt"), "already here").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "exists.txt", "old_string": "", "new_string": "x"}))
            .await;
        assert_eq!(
            result.error.unwrap().error_type,
            ToolErrorType::AttemptToCreateExistingFile
        );
    }

    #[tokio::test]
    async fn dry_run_does_not_write() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo").unwrap();
        let tool = EditFileTool::new(dir.path().to_path_buf(), true);
        let result = tool
            .invoke(json!({"file_path": "a.txt", "old_string": "foo", "new_string": "bar"}))
            .await;
        assert!(!result.is_error());
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "foo");
    }
}

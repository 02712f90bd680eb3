//! `list_directory` and `read_many_files` (spec.md §4.5.7, §4.5.8).

use super::{LlmContent, Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

const DEFAULT_MAX_ENTRIES: usize = 100;
const ABSOLUTE_MAX_ENTRIES: usize = 500;

fn glob_match(filename: &str, pattern: &str) -> bool {
    glob::Pattern::new(pattern)
        .map(|p| p.matches(filename))
        .unwrap_or(false)
}

fn read_ignore_file(path: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|content| {
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| l.trim_end_matches('/').to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Lists a directory's entries, directories first then files, both
/// alphabetically, paginated and bounded to prevent context overflow.
pub struct ListDirectoryTool {
    workspace_root: PathBuf,
}

impl ListDirectoryTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List files and subdirectories in a directory, sorted directories-first then \
         alphabetically, with pagination to avoid flooding the context window."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dir_path": {"type": "string", "description": "Path to the directory to list"},
                "ignore": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Glob patterns to ignore"
                },
                "respect_git_ignore": {"type": "boolean", "description": "Honor .gitignore (default true)"},
                "respect_gemini_ignore": {"type": "boolean", "description": "Honor .geminiignore (default true)"},
                "limit": {"type": "integer", "description": "Maximum entries to return (default 100, hard cap 500)"},
                "offset": {"type": "integer", "description": "Entries to skip for pagination (default 0)"}
            },
            "required": ["dir_path"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let dir_path = match args["dir_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::err("dir_path is required", ToolErrorType::InvalidParameter),
        };
        let limit = args["limit"]
            .as_u64()
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_MAX_ENTRIES)
            .min(ABSOLUTE_MAX_ENTRIES);
        let offset = args["offset"].as_u64().map(|v| v as usize).unwrap_or(0);
        let respect_git_ignore = args["respect_git_ignore"].as_bool().unwrap_or(true);
        let respect_gemini_ignore = args["respect_gemini_ignore"].as_bool().unwrap_or(true);

        let full_path = if PathBuf::from(dir_path).is_absolute() {
            PathBuf::from(dir_path)
        } else {
            self.workspace_root.join(dir_path)
        };

        if !full_path.exists() {
            return ToolResult::err(
                format!("Directory not found: {dir_path}"),
                ToolErrorType::DirectoryNotFound,
            );
        }
        if !full_path.is_dir() {
            return ToolResult::err(
                format!("Path is not a directory: {dir_path}"),
                ToolErrorType::NotADirectory,
            );
        }

        let mut ignore_patterns: Vec<String> = args["ignore"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if respect_git_ignore {
            ignore_patterns.extend(read_ignore_file(&full_path.join(".gitignore")));
        }
        if respect_gemini_ignore {
            ignore_patterns.extend(read_ignore_file(&full_path.join(".geminiignore")));
        }

        let entries = match std::fs::read_dir(&full_path) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return ToolResult::err(
                    format!("Permission denied: {dir_path}"),
                    ToolErrorType::PermissionDenied,
                )
            }
            Err(e) => {
                return ToolResult::err(
                    format!("Error listing directory: {e}"),
                    ToolErrorType::ExecutionError,
                )
            }
        };

        let mut directories = Vec::new();
        let mut files = Vec::new();
        let mut ignored_count = 0;
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if ignore_patterns.iter().any(|p| glob_match(&name, p)) {
                ignored_count += 1;
                continue;
            }
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => directories.push(name),
                Ok(_) => files.push(name),
                Err(_) => continue,
            }
        }
        directories.sort_by_key(|s| s.to_lowercase());
        files.sort_by_key(|s| s.to_lowercase());

        let mut all_entries: Vec<String> =
            directories.iter().map(|d| format!("[DIR] {d}")).collect();
        all_entries.extend(files.iter().cloned());

        let total_count = all_entries.len();
        let start = offset.min(total_count);
        let end = (start + limit).min(total_count);
        let page = &all_entries[start..end];
        let is_truncated = end < total_count;

        let mut content_lines = vec![format!("Directory listing for {}:", full_path.display())];
        content_lines.extend(page.iter().cloned());
        if is_truncated {
            content_lines.push(format!(
                "\n... and {} more entries (use offset={end} to continue)",
                total_count - end
            ));
        }

        let message = if ignored_count > 0 {
            format!(
                "Listed {} of {total_count} item(s). ({ignored_count} ignored)",
                page.len()
            )
        } else {
            format!("Listed {} of {total_count} item(s).", page.len())
        };

        let mut data = json!({
            "path": dir_path,
            "directories": directories.len(),
            "files": files.len(),
            "total_count": total_count,
            "returned_count": page.len(),
            "offset": start,
            "limit": limit,
            "truncated": is_truncated,
        });
        if is_truncated {
            data["remaining"] = json!(total_count - end);
            data["next_offset"] = json!(end);
        }
        if ignored_count > 0 {
            data["ignored"] = json!(ignored_count);
        }

        ToolResult::ok_with_data(content_lines.join("\n"), message, data)
    }
}

const READ_MANY_DEFAULT_EXCLUDES: &[&str] = &[
    "**/node_modules/**",
    "**/.git/**",
    "**/dist/**",
    "**/build/**",
    "**/__pycache__/**",
];

const PER_FILE_CAP_BYTES: u64 = 1024 * 1024;
const AGGREGATE_CAP_BYTES: u64 = 10 * 1024 * 1024;

/// Reads and concatenates multiple files matched by include/exclude glob
/// patterns, skipping binaries and enforcing per-file and aggregate caps.
pub struct ReadManyFilesTool {
    workspace_root: PathBuf,
}

impl ReadManyFilesTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(1024).any(|&b| b == 0)
}

#[async_trait]
impl Tool for ReadManyFilesTool {
    fn name(&self) -> &str {
        "read_many_files"
    }

    fn description(&self) -> &str {
        "Read and concatenate the contents of multiple files matched by glob patterns, \
         separated by `--- <path> ---` headers."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "include": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Glob patterns of files to include"
                },
                "exclude": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Glob patterns of files to exclude"
                },
                "recursive": {"type": "boolean", "description": "Recurse into subdirectories (default true)"},
                "use_default_excludes": {
                    "type": "boolean",
                    "description": "Apply default excludes (node_modules, .git, dist, build, __pycache__); default true"
                }
            },
            "required": ["include"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let include: Vec<String> = match args["include"].as_array() {
            Some(a) => a.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
            None => return ToolResult::err("include is required", ToolErrorType::InvalidParameter),
        };
        if include.is_empty() {
            return ToolResult::err("include must contain at least one pattern", ToolErrorType::InvalidParameter);
        }
        let exclude: Vec<String> = args["exclude"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let recursive = args["recursive"].as_bool().unwrap_or(true);
        let use_default_excludes = args["use_default_excludes"].as_bool().unwrap_or(true);

        let mut exclude_patterns: Vec<String> = exclude;
        if use_default_excludes {
            exclude_patterns.extend(READ_MANY_DEFAULT_EXCLUDES.iter().map(|s| s.to_string()));
        }

        let mut walker = ignore::WalkBuilder::new(&self.workspace_root);
        walker.hidden(false).max_depth(if recursive { None } else { Some(1) });
        let walk = walker.build();

        let include_patterns: Vec<glob::Pattern> = include
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        let exclude_compiled: Vec<glob::Pattern> = exclude_patterns
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();

        let mut matched_paths = Vec::new();
        for entry in walk.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let rel = path.strip_prefix(&self.workspace_root).unwrap_or(path);
            let rel_str = rel.to_string_lossy();

            if !include_patterns.iter().any(|p| p.matches(&rel_str)) {
                continue;
            }
            if exclude_compiled.iter().any(|p| p.matches(&rel_str)) {
                continue;
            }
            matched_paths.push(path.to_path_buf());
        }
        matched_paths.sort();

        let mut sections = Vec::new();
        let mut aggregate_bytes: u64 = 0;
        let mut skipped_binary = Vec::new();
        let mut skipped_size = Vec::new();

        for path in &matched_paths {
            let metadata = match tokio::fs::metadata(path).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() > PER_FILE_CAP_BYTES {
                skipped_size.push(path.display().to_string());
                continue;
            }
            if aggregate_bytes + metadata.len() > AGGREGATE_CAP_BYTES {
                break;
            }

            let bytes = match tokio::fs::read(path).await {
                Ok(b) => b,
                Err(_) => continue,
            };
            if looks_binary(&bytes) {
                skipped_binary.push(path.display().to_string());
                continue;
            }
            let content = String::from_utf8_lossy(&bytes).to_string();
            aggregate_bytes += metadata.len();

            let rel = path.strip_prefix(&self.workspace_root).unwrap_or(path);
            sections.push(format!("--- {} ---\n{}", rel.display(), content));
        }

        let body = sections.join("\n\n");
        let display = format!(
            "Read {} file(s){}{}",
            sections.len(),
            if skipped_binary.is_empty() {
                String::new()
            } else {
                format!(", skipped {} binary", skipped_binary.len())
            },
            if skipped_size.is_empty() {
                String::new()
            } else {
                format!(", skipped {} oversized", skipped_size.len())
            }
        );

        ToolResult::ok_with_data(
            body,
            display,
            json!({
                "files_read": sections.len(),
                "skipped_binary": skipped_binary,
                "skipped_size": skipped_size,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn list_directory_sorts_dirs_first_then_alpha() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("alpha_dir")).unwrap();
        std::fs::write(dir.path().join("beta.txt"), "x").unwrap();

        let tool = ListDirectoryTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"dir_path": "."})).await;
        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert_eq!(data["directories"], 2);
        assert_eq!(data["files"], 1);
    }

    #[tokio::test]
    async fn list_directory_paginates_with_next_offset() {
        let dir = TempDir::new().unwrap();
        for i in 0..10 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "x").unwrap();
        }
        let tool = ListDirectoryTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"dir_path": ".", "limit": 4})).await;
        let data = result.data.unwrap();
        assert!(data["truncated"].as_bool().unwrap());
        assert_eq!(data["next_offset"], 4);
    }

    #[tokio::test]
    async fn list_directory_missing_reports_not_found() {
        let dir = TempDir::new().unwrap();
        let tool = ListDirectoryTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"dir_path": "nope"})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::DirectoryNotFound);
    }

    #[tokio::test]
    async fn read_many_files_concatenates_with_headers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), "world").unwrap();

        let tool = ReadManyFilesTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"include": ["*.txt"]})).await;
        assert!(!result.is_error());
        if let LlmContent::Text(t) = result.llm_content {
            assert!(t.contains("--- a.txt ---"));
            assert!(t.contains("hello"));
        } else {
            panic!("expected text content");
        }
    }
}

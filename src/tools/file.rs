//! `read_file` and `write_file` (spec.md §4.5.1, §4.5.2).

use super::{LlmContent, Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::path::PathBuf;

const MAX_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_LINE_LIMIT: usize = 2000;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "aiff", "aac", "ogg", "flac"];

fn binary_mime_type(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        "mp3" => Some("audio/mpeg"),
        "wav" => Some("audio/wav"),
        "aiff" => Some("audio/aiff"),
        "aac" => Some("audio/aac"),
        "ogg" => Some("audio/ogg"),
        "flac" => Some("audio/flac"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

fn is_binary_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext) || AUDIO_EXTENSIONS.contains(&ext) || ext == "pdf"
}

fn resolve_path(workspace_root: &std::path::Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        workspace_root.join(path)
    }
}

/// Reads file contents with line-numbered, offset/limit-bounded text, or an
/// inline-data part for recognized binary media types.
pub struct ReadFileTool {
    workspace_root: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Text files are returned with line numbers, bounded by \
         offset/limit. Images, audio, and PDFs are returned as inline base64 data."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "description": "0-based line number to start reading from (optional)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default 2000)"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let file_path = match args["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::err("file_path is required", ToolErrorType::InvalidParameter),
        };
        let offset = args["offset"].as_u64().map(|v| v as usize).unwrap_or(0);
        let limit = args["limit"]
            .as_u64()
            .map(|v| v as usize)
            .filter(|&v| v > 0)
            .unwrap_or(DEFAULT_LINE_LIMIT);

        let full_path = resolve_path(&self.workspace_root, file_path);

        if !full_path.exists() {
            return ToolResult::err(
                format!("File not found: {file_path}"),
                ToolErrorType::FileNotFound,
            );
        }
        if full_path.is_dir() {
            return ToolResult::err(
                format!("Path is a directory, not a file: {file_path}"),
                ToolErrorType::PathIsDirectory,
            );
        }

        let metadata = match tokio::fs::metadata(&full_path).await {
            Ok(m) => m,
            Err(e) => return io_error_result(&e, file_path),
        };
        if metadata.len() > MAX_FILE_SIZE_BYTES {
            return ToolResult::err(
                format!(
                    "File too large ({} bytes). Maximum size is {} bytes.",
                    metadata.len(),
                    MAX_FILE_SIZE_BYTES
                ),
                ToolErrorType::FileTooLarge,
            );
        }

        let ext = full_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        if is_binary_extension(&ext) {
            return match tokio::fs::read(&full_path).await {
                Ok(bytes) => {
                    let mime_type = binary_mime_type(&ext)
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                    ToolResult::ok(
                        LlmContent::InlineData {
                            mime_type: mime_type.clone(),
                            data,
                        },
                        format!("Read {} bytes of {mime_type} from {file_path}", bytes.len()),
                    )
                }
                Err(e) => io_error_result(&e, file_path),
            };
        }

        let bytes = match tokio::fs::read(&full_path).await {
            Ok(b) => b,
            Err(e) => return io_error_result(&e, file_path),
        };
        // Detect encoding the way the original does: attempt UTF-8, fall back
        // to treating each byte as a Latin-1 code point.
        let content = match String::from_utf8(bytes.clone()) {
            Ok(s) => s,
            Err(_) => bytes.iter().map(|&b| b as char).collect(),
        };

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let end = (offset + limit).min(total_lines);
        let start = offset.min(total_lines);
        let selected = &lines[start..end];

        let width = (start + selected.len()).max(1).to_string().len();
        let numbered: Vec<String> = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>width$}| {}", start + i + 1, line, width = width))
            .collect();
        let body = numbered.join("\n");

        let is_truncated = end < total_lines;
        let mut display = format!(
            "Read lines {}-{} of {} from {file_path}",
            start + 1,
            end,
            total_lines
        );
        let mut payload = json!({
            "type": "text",
            "file_path": file_path,
            "lines_shown": [start + 1, end],
            "total_lines": total_lines,
        });
        if is_truncated {
            payload["truncated"] = json!(true);
            payload["next_offset"] = json!(end);
            display = format!(
                "File content truncated. Showing lines {}-{} of {total_lines}. Use offset={end} to read more.",
                start + 1,
                end
            );
        }

        ToolResult::ok_with_data(body, display, payload)
    }
}

fn io_error_result(e: &std::io::Error, file_path: &str) -> ToolResult {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        ToolResult::err(
            format!("Permission denied: {file_path}"),
            ToolErrorType::PermissionDenied,
        )
    } else {
        ToolResult::err(format!("Error reading {file_path}: {e}"), ToolErrorType::ExecutionError)
    }
}

/// Writes file contents, creating parent directories as needed and preserving
/// an existing file's CRLF line endings (spec.md §4.5.2, I2).
pub struct WriteFileTool {
    workspace_root: PathBuf,
    dry_run: bool,
}

impl WriteFileTool {
    pub fn new(workspace_root: PathBuf, dry_run: bool) -> Self {
        Self { workspace_root, dry_run }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it (and parent directories) if needed, or \
         overwriting it if it exists."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute or workspace-relative path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let file_path = match args["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::err("file_path is required", ToolErrorType::InvalidParameter),
        };
        let content = match args["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::err("content is required", ToolErrorType::InvalidParameter),
        };

        let full_path = resolve_path(&self.workspace_root, file_path);
        if full_path.is_dir() {
            return ToolResult::err(
                format!("Path is a directory, not a file: {file_path}"),
                ToolErrorType::TargetIsDirectory,
            );
        }

        let operation = if full_path.exists() { "update" } else { "create" };

        let existing_was_crlf = if operation == "update" {
            match tokio::fs::read_to_string(&full_path).await {
                Ok(existing) => existing.contains("\r\n"),
                Err(_) => false,
            }
        } else {
            false
        };

        let final_content = if existing_was_crlf && !content.contains("\r\n") {
            content.replace('\n', "\r\n")
        } else {
            content.to_string()
        };

        if self.dry_run {
            return ToolResult::ok_with_data(
                format!("[dry run] Would {operation} {file_path}"),
                format!("[dry run] Would {operation} {file_path}"),
                json!({"success": true, "operation": operation, "dry_run": true}),
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

        if let Err(e) = tokio::fs::write(&full_path, &final_content).await {
            return io_error_result(&e, file_path);
        }

        let num_lines = final_content.lines().count();
        ToolResult::ok_with_data(
            format!("Wrote {num_lines} lines to {file_path} ({operation})"),
            format!("{operation:?}: {file_path} ({num_lines} lines)"),
            json!({"success": true, "operation": operation, "num_lines": num_lines}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn read_file_adds_line_numbers_and_bounds() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.txt"), "line 1\nline 2\nline 3").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"file_path": "test.txt"})).await;

        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert_eq!(data["total_lines"], 3);
        if let LlmContent::Text(t) = result.llm_content {
            assert!(t.contains("1| line 1"));
        } else {
            panic!("expected text content");
        }
    }

    #[tokio::test]
    async fn read_file_missing_reports_file_not_found() {
        let dir = TempDir::new().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"file_path": "nope.txt"})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::FileNotFound);
    }

    #[tokio::test]
    async fn read_file_contiguous_pagination_covers_i3() {
        let dir = TempDir::new().unwrap();
        let lines: Vec<String> = (0..50).map(|i| format!("line{i}")).collect();
        std::fs::write(dir.path().join("big.txt"), lines.join("\n")).unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let first = tool
            .invoke(json!({"file_path": "big.txt", "offset": 0, "limit": 20}))
            .await;
        let first_data = first.data.unwrap();
        let next_offset = first_data["next_offset"].as_u64().unwrap();
        assert_eq!(next_offset, 20);

        let second = tool
            .invoke(json!({"file_path": "big.txt", "offset": next_offset, "limit": 20}))
            .await;
        let second_data = second.data.unwrap();
        assert_eq!(second_data["lines_shown"][0], 21);
    }

    #[tokio::test]
    async fn write_file_creates_with_parents() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "nested/new.txt", "content": "hello\nworld"}))
            .await;
        assert!(!result.is_error());
        assert_eq!(result.data.unwrap()["operation"], "create");

        let content = std::fs::read_to_string(dir.path().join("nested/new.txt")).unwrap();
        assert_eq!(content, "hello\nworld");
    }

    #[tokio::test]
    async fn write_file_preserves_crlf_on_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crlf.txt");
        std::fs::write(&path, "a\r\nb\r\n").unwrap();

        let tool = WriteFileTool::new(dir.path().to_path_buf(), false);
        let result = tool
            .invoke(json!({"file_path": "crlf.txt", "content": "a\nb\nc"}))
            .await;
        assert!(!result.is_error());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a\r\nb\r\nc");
    }

    #[tokio::test]
    async fn write_file_dry_run_does_not_touch_disk() {
        let dir = TempDir::new().unwrap();
        let tool = WriteFileTool::new(dir.path().to_path_buf(), true);
        let result = tool
            .invoke(json!({"file_path": "ghost.txt", "content": "x"}))
            .await;
        assert!(!result.is_error());
        assert!(!dir.path().join("ghost.txt").exists());
    }
}

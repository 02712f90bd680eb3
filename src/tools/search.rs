//! `search_file_content` (VCS-grep → system-grep → in-process-walker cascade)
//! and `glob` (recency-then-alphabetical file finder). Spec.md §4.5.5, §4.5.6.

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TOTAL_MAX_MATCHES: usize = 500;
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules", ".git", "__pycache__", "venv", ".venv", "dist", "build", ".tox", ".eggs",
];

struct GrepMatch {
    file_path: String,
    line_number: usize,
    line: String,
}

fn parse_grep_line(line: &str, base_path: &Path) -> Option<GrepMatch> {
    if line.trim().is_empty() {
        return None;
    }
    let re = Regex::new(r"^(.+?):(\d+):(.*)$").ok()?;
    let caps = re.captures(line)?;
    let file_path_raw = caps.get(1)?.as_str();
    let line_number: usize = caps.get(2)?.as_str().parse().ok()?;
    let line_content = caps.get(3)?.as_str().to_string();

    let absolute = base_path.join(file_path_raw);
    let relative = absolute.strip_prefix(base_path).ok()?;
    if relative.starts_with("..") || relative.is_absolute() {
        return None;
    }

    Some(GrepMatch {
        file_path: relative.to_string_lossy().to_string(),
        line_number,
        line: line_content,
    })
}

async fn is_git_repository(path: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn run_grep_like(
    program: &str,
    args: &[String],
    cwd: &Path,
    base_path: &Path,
    max_matches: usize,
) -> Option<Vec<GrepMatch>> {
    let output = tokio::time::timeout(
        SEARCH_TIMEOUT,
        Command::new(program).args(args).current_dir(cwd).output(),
    )
    .await
    .ok()?
    .ok()?;

    // exit 0 = matches, 1 = no matches, anything else = treat as unavailable/error
    if output.status.code() != Some(0) && output.status.code() != Some(1) {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut matches = Vec::new();
    for line in stdout.lines() {
        if let Some(m) = parse_grep_line(line, base_path) {
            matches.push(m);
            if matches.len() >= max_matches {
                break;
            }
        }
    }
    Some(matches)
}

async fn git_grep(
    pattern: &str,
    search_path: &Path,
    include: Option<&str>,
    max_matches: usize,
) -> Option<Vec<GrepMatch>> {
    if !is_git_repository(search_path).await {
        return None;
    }
    let mut args = vec![
        "grep".to_string(),
        "--untracked".to_string(),
        "-n".to_string(),
        "-E".to_string(),
        "--ignore-case".to_string(),
        pattern.to_string(),
    ];
    if let Some(include) = include {
        args.push("--".to_string());
        args.push(include.to_string());
    }
    run_grep_like("git", &args, search_path, search_path, max_matches).await
}

async fn system_grep(
    pattern: &str,
    search_path: &Path,
    include: Option<&str>,
    max_matches: usize,
) -> Option<Vec<GrepMatch>> {
    let mut args = vec![
        "-r".to_string(),
        "-n".to_string(),
        "-H".to_string(),
        "-E".to_string(),
        "-I".to_string(),
        "--ignore-case".to_string(),
    ];
    for exclude in DEFAULT_EXCLUDES {
        args.push(format!("--exclude-dir={exclude}"));
    }
    if let Some(include) = include {
        args.push(format!("--include={include}"));
    }
    args.push(pattern.to_string());
    args.push(".".to_string());
    run_grep_like("grep", &args, search_path, search_path, max_matches).await
}

fn should_exclude(rel_path: &Path, excludes: &[&str]) -> bool {
    rel_path.components().any(|c| {
        let part = c.as_os_str().to_string_lossy();
        excludes
            .iter()
            .any(|pattern| glob::Pattern::new(pattern).map(|p| p.matches(&part)).unwrap_or(false))
    })
}

fn walker_grep(
    pattern: &str,
    search_path: &Path,
    include: Option<&str>,
    max_matches: usize,
) -> Vec<GrepMatch> {
    let mut matches = Vec::new();
    let regex = match regex::RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(r) => r,
        Err(_) => return matches,
    };
    let include_pattern = include.and_then(|p| glob::Pattern::new(p).ok());

    for entry in walkdir::WalkDir::new(search_path).into_iter().filter_entry(|e| {
        let rel = e.path().strip_prefix(search_path).unwrap_or(e.path());
        !should_exclude(rel, DEFAULT_EXCLUDES)
    }) {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry.path().strip_prefix(search_path).unwrap_or(entry.path());
        if let Some(name) = entry.file_name().to_str() {
            if let Some(p) = &include_pattern {
                if !p.matches(name) {
                    continue;
                }
            }
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else { continue };
        for (i, line) in content.lines().enumerate() {
            if matches.len() >= max_matches {
                return matches;
            }
            if regex.is_match(line) {
                matches.push(GrepMatch {
                    file_path: rel_path.to_string_lossy().to_string(),
                    line_number: i + 1,
                    line: line.to_string(),
                });
            }
        }
    }
    matches
}

pub struct GrepSearchTool {
    workspace_root: PathBuf,
}

impl GrepSearchTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for GrepSearchTool {
    fn name(&self) -> &str {
        "search_file_content"
    }

    fn description(&self) -> &str {
        "Search for a regular expression pattern within file contents. Tries `git grep`, \
         then system `grep`, then an in-process walker, in that order. Results are capped at \
         500 matches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "The regular expression pattern to search for"},
                "dir_path": {"type": "string", "description": "Directory to search in (default: workspace root)"},
                "include": {"type": "string", "description": "Glob pattern to filter files, e.g. \"*.rs\""}
            },
            "required": ["pattern"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let pattern = match args["pattern"].as_str() {
            Some(p) => p,
            None => return ToolResult::err("pattern is required", ToolErrorType::InvalidParameter),
        };
        if Regex::new(pattern).is_err() {
            return ToolResult::err(
                format!("Invalid regular expression pattern: {pattern}"),
                ToolErrorType::InvalidPattern,
            );
        }
        let dir_path = args["dir_path"].as_str();
        let include = args["include"].as_str();

        let search_path = match dir_path {
            Some(p) => {
                let resolved = if PathBuf::from(p).is_absolute() {
                    PathBuf::from(p)
                } else {
                    self.workspace_root.join(p)
                };
                if !resolved.exists() {
                    return ToolResult::err(
                        format!("Path does not exist: {}", resolved.display()),
                        ToolErrorType::FileNotFound,
                    );
                }
                if !resolved.is_dir() {
                    return ToolResult::err(
                        format!("Path is not a directory: {}", resolved.display()),
                        ToolErrorType::NotADirectory,
                    );
                }
                resolved
            }
            None => self.workspace_root.clone(),
        };

        let max_matches = DEFAULT_TOTAL_MAX_MATCHES;
        let (matches, strategy) = if let Some(m) = git_grep(pattern, &search_path, include, max_matches).await {
            (m, "git grep")
        } else if let Some(m) = system_grep(pattern, &search_path, include, max_matches).await {
            (m, "system grep")
        } else {
            (walker_grep(pattern, &search_path, include, max_matches), "in-process walker")
        };

        let search_display = dir_path.unwrap_or(".");
        let filter_desc = include.map(|i| format!(" (filter: \"{i}\")")).unwrap_or_default();

        if matches.is_empty() {
            return ToolResult::ok(
                format!("No matches found for pattern \"{pattern}\" in path \"{search_display}\"{filter_desc}."),
                "No matches found",
            );
        }

        let truncated = matches.len() >= max_matches;
        let mut by_file: std::collections::BTreeMap<String, Vec<&GrepMatch>> =
            std::collections::BTreeMap::new();
        for m in &matches {
            by_file.entry(m.file_path.clone()).or_default().push(m);
        }
        for file_matches in by_file.values_mut() {
            file_matches.sort_by_key(|m| m.line_number);
        }

        let match_count = matches.len();
        let match_term = if match_count == 1 { "match" } else { "matches" };
        let truncation_note = if truncated {
            format!(" (results limited to {max_matches} matches for performance)")
        } else {
            String::new()
        };

        let mut body = format!(
            "Found {match_count} {match_term} for pattern \"{pattern}\" in path \"{search_display}\"{filter_desc}{truncation_note} (via {strategy}):\n---\n"
        );
        for (file, file_matches) in &by_file {
            body.push_str(&format!("File: {file}\n"));
            for m in file_matches {
                body.push_str(&format!("L{}: {}\n", m.line_number, m.line.trim()));
            }
            body.push_str("---\n");
        }

        ToolResult::ok_with_data(
            body.trim_end().to_string(),
            format!("Found {match_count} {match_term}{}", if truncated { " (limited)" } else { "" }),
            json!({"match_count": match_count, "truncated": truncated, "strategy_used": strategy}),
        )
    }
}

const GLOB_DEFAULT_EXCLUDES: &[&str] = &[
    "node_modules", ".git", "__pycache__", "venv", ".venv", "dist", "build", ".tox", ".eggs",
    "*.egg-info",
];
const RECENCY_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

fn read_ignore_patterns(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
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

pub struct GlobSearchTool {
    workspace_root: PathBuf,
}

impl GlobSearchTool {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self { workspace_root }
    }
}

#[async_trait]
impl Tool for GlobSearchTool {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern (e.g. \"**/*.rs\"). Results are sorted with files \
         modified in the last 24h first (newest first), then alphabetically."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Glob pattern, e.g. \"**/*.py\" or \"docs/*.md\""},
                "dir_path": {"type": "string", "description": "Directory to search in (default: workspace root)"},
                "case_sensitive": {"type": "boolean", "description": "Match case-sensitively (default false)"},
                "respect_git_ignore": {"type": "boolean", "description": "Honor .gitignore (default true)"},
                "respect_gemini_ignore": {"type": "boolean", "description": "Honor .geminiignore (default true)"}
            },
            "required": ["pattern"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let pattern = match args["pattern"].as_str() {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                return ToolResult::err(
                    "The 'pattern' parameter cannot be empty.",
                    ToolErrorType::InvalidPattern,
                )
            }
        };
        let dir_path = args["dir_path"].as_str();
        let case_sensitive = args["case_sensitive"].as_bool().unwrap_or(false);
        let respect_git_ignore = args["respect_git_ignore"].as_bool().unwrap_or(true);
        let respect_gemini_ignore = args["respect_gemini_ignore"].as_bool().unwrap_or(true);

        let search_dir = match dir_path {
            Some(p) => {
                let resolved = if PathBuf::from(p).is_absolute() {
                    PathBuf::from(p)
                } else {
                    self.workspace_root.join(p)
                };
                if !resolved.exists() {
                    return ToolResult::err(
                        format!("Search path does not exist: {}", resolved.display()),
                        ToolErrorType::DirectoryNotFound,
                    );
                }
                if !resolved.is_dir() {
                    return ToolResult::err(
                        format!("Search path is not a directory: {}", resolved.display()),
                        ToolErrorType::NotADirectory,
                    );
                }
                resolved
            }
            None => self.workspace_root.clone(),
        };

        let mut excludes: Vec<String> = GLOB_DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        if respect_git_ignore {
            excludes.extend(read_ignore_patterns(&search_dir, ".gitignore"));
        }
        if respect_gemini_ignore {
            excludes.extend(read_ignore_patterns(&search_dir, ".geminiignore"));
        }

        let full_pattern = if pattern.starts_with("**/") || pattern.starts_with('/') {
            search_dir.join(pattern)
        } else {
            search_dir.join("**").join(pattern)
        };

        let glob_options = glob::MatchOptions {
            case_sensitive,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };

        let mut results: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
        if let Ok(paths) = glob::glob_with(&full_pattern.to_string_lossy(), glob_options) {
            for entry in paths.flatten() {
                if entry.is_dir() {
                    continue;
                }
                let rel = entry.strip_prefix(&search_dir).unwrap_or(&entry);
                if should_exclude(rel, &excludes.iter().map(String::as_str).collect::<Vec<_>>()) {
                    continue;
                }
                let mtime = std::fs::metadata(&entry)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH);
                results.push((entry, mtime));
            }
        }

        let now = std::time::SystemTime::now();
        results.sort_by(|(path_a, mtime_a), (path_b, mtime_b)| {
            let recent_a = now.duration_since(*mtime_a).unwrap_or_default() < RECENCY_THRESHOLD;
            let recent_b = now.duration_since(*mtime_b).unwrap_or_default() < RECENCY_THRESHOLD;
            match (recent_a, recent_b) {
                (true, true) => mtime_b.cmp(mtime_a).then_with(|| path_a.cmp(path_b)),
                (true, false) => std::cmp::Ordering::Less,
                (false, true) => std::cmp::Ordering::Greater,
                (false, false) => path_a.cmp(path_b),
            }
        });

        if results.is_empty() {
            return ToolResult::ok(
                format!(
                    "No files found matching pattern \"{pattern}\" within {}",
                    search_dir.display()
                ),
                "No files found",
            );
        }

        let file_count = results.len();
        let file_list: Vec<String> =
            results.iter().map(|(p, _)| p.display().to_string()).collect();

        ToolResult::ok_with_data(
            format!(
                "Found {file_count} file(s) matching \"{pattern}\" within {}, sorted by modification time (newest first):\n{}",
                search_dir.display(),
                file_list.join("\n")
            ),
            format!("Found {file_count} matching file(s)"),
            json!({"file_count": file_count, "files": file_list}),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn invalid_pattern_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tool = GrepSearchTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"pattern": "("})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidPattern);
    }

    #[tokio::test]
    async fn finds_matches_via_walker_fallback_outside_git() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() { println!(\"hi\"); }").unwrap();
        let tool = GrepSearchTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"pattern": "println"})).await;
        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert_eq!(data["match_count"], 1);
    }

    #[tokio::test]
    async fn no_matches_reports_plain_text() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "nothing interesting").unwrap();
        let tool = GrepSearchTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"pattern": "zzzznotfound"})).await;
        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn glob_empty_pattern_is_rejected() {
        let dir = TempDir::new().unwrap();
        let tool = GlobSearchTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"pattern": "   "})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidPattern);
    }

    #[tokio::test]
    async fn glob_finds_matching_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.rs"), "x").unwrap();
        std::fs::write(dir.path().join("b.txt"), "x").unwrap();
        let tool = GlobSearchTool::new(dir.path().to_path_buf());
        let result = tool.invoke(json!({"pattern": "*.rs"})).await;
        assert!(!result.is_error());
        let data = result.data.unwrap();
        assert_eq!(data["file_count"], 1);
    }
}

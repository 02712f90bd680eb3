//! `run_shell_command` — process-group-isolated shell execution with
//! streaming output, timeout escalation, and background jobs (spec.md §4.5.4).

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::Duration;

const DEFAULT_TIMEOUT_MS: u64 = crate::DEFAULT_SHELL_TIMEOUT_MS;
const OUTPUT_UPDATE_INTERVAL_MS: u64 = 1000;
const BACKGROUND_DELAY_MS: u64 = 200;

fn spawn_command(command: &str, cwd: &std::path::Path) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("powershell.exe");
        cmd.arg("-NoProfile").arg("-Command").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.current_dir(cwd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    cmd
}

#[cfg(unix)]
fn kill_process_group(pid: i32, sig: i32) {
    unsafe {
        libc::kill(-pid, sig);
    }
}

/// Streams stdout+stderr from `child` into one buffer, killing the process
/// group on `timeout` expiry (SIGTERM, then SIGKILL after 500ms).
async fn stream_with_timeout(
    mut child: Child,
    timeout: Option<Duration>,
) -> (String, Option<i32>, bool) {
    let pid = child.id().map(|p| p as i32);
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let buffer = Arc::new(Mutex::new(String::new()));

    let out_buffer = buffer.clone();
    let stdout_task = tokio::spawn(async move {
        if let Some(mut s) = stdout.take() {
            let mut chunk = [0u8; 4096];
            loop {
                match s.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let decoded = String::from_utf8_lossy(&chunk[..n]).to_string();
                        out_buffer.lock().await.push_str(&decoded);
                    }
                }
            }
        }
    });
    let err_buffer = buffer.clone();
    let stderr_task = tokio::spawn(async move {
        if let Some(mut s) = stderr.take() {
            let mut chunk = [0u8; 4096];
            loop {
                match s.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let decoded = String::from_utf8_lossy(&chunk[..n]).to_string();
                        err_buffer.lock().await.push_str(&decoded);
                    }
                }
            }
        }
    });

    let wait_future = child.wait();
    let (exit_code, timed_out) = match timeout {
        Some(d) => match tokio::time::timeout(d, wait_future).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(_)) => (None, false),
            Err(_) => {
                #[cfg(unix)]
                if let Some(pid) = pid {
                    kill_process_group(pid, libc::SIGTERM);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    kill_process_group(pid, libc::SIGKILL);
                }
                #[cfg(windows)]
                {
                    let _ = child.kill().await;
                }
                let _ = child.wait().await;
                (None, true)
            }
        },
        None => match wait_future.await {
            Ok(status) => (status.code(), false),
            Err(_) => (None, false),
        },
    };

    let _ = tokio::time::timeout(Duration::from_secs(5), stdout_task).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), stderr_task).await;

    let output = Arc::try_unwrap(buffer)
        .map(|m| m.into_inner())
        .unwrap_or_default();
    (output, exit_code, timed_out)
}

pub struct BashTool {
    workspace_root: PathBuf,
    dry_run: bool,
}

impl BashTool {
    pub fn new(workspace_root: PathBuf, dry_run: bool) -> Self {
        Self { workspace_root, dry_run }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "run_shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command (via `bash -c`) in an isolated process group. Supports a \
         timeout, running in a working directory other than the workspace root, and \
         background execution for long-running processes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The exact command to execute"},
                "description": {"type": "string", "description": "Brief description of the command"},
                "dir_path": {"type": "string", "description": "Directory to run the command in"},
                "is_background": {"type": "boolean", "description": "Run in background (default false)"},
                "timeout_ms": {"type": "integer", "description": "Timeout in milliseconds, 0 for no timeout (default 300000)"}
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let command = match args["command"].as_str() {
            Some(c) if !c.trim().is_empty() => c,
            _ => {
                return ToolResult::err("Command cannot be empty.", ToolErrorType::InvalidCommand);
            }
        };
        let dir_path = args["dir_path"].as_str();
        let is_background = args["is_background"].as_bool().unwrap_or(false);
        let timeout_ms = args["timeout_ms"].as_u64().unwrap_or(DEFAULT_TIMEOUT_MS);

        let cwd = match dir_path {
            Some(p) => {
                let resolved = if PathBuf::from(p).is_absolute() {
                    PathBuf::from(p)
                } else {
                    self.workspace_root.join(p)
                };
                if !resolved.exists() {
                    return ToolResult::err(
                        format!("Directory not found: {p}"),
                        ToolErrorType::DirectoryNotFound,
                    );
                }
                if !resolved.is_dir() {
                    return ToolResult::err(
                        format!("Path is not a directory: {p}"),
                        ToolErrorType::NotADirectory,
                    );
                }
                resolved
            }
            None => self.workspace_root.clone(),
        };

        if self.dry_run {
            return ToolResult::ok_with_data(
                format!("[dry run] Would execute: {command}"),
                format!("[dry run] {command}"),
                json!({"success": true, "dry_run": true}),
            );
        }

        if is_background {
            let mut cmd = spawn_command(command, &cwd);
            let mut child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return ToolResult::err(
                        format!("Command not found: bash ({e})"),
                        ToolErrorType::ShellNotFound,
                    )
                }
                Err(e) => {
                    return ToolResult::err(
                        format!("Error executing shell command: {e}"),
                        ToolErrorType::ShellExecuteError,
                    )
                }
            };
            let pid = child.id();

            tokio::time::sleep(Duration::from_millis(BACKGROUND_DELAY_MS)).await;

            match child.try_wait() {
                Ok(Some(status)) => {
                    // Exited immediately; treat as a regular foreground result.
                    let mut output = String::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        let _ = stdout.read_to_string(&mut output).await;
                    }
                    let mut stderr_out = String::new();
                    if let Some(mut stderr) = child.stderr.take() {
                        let _ = stderr.read_to_string(&mut stderr_out).await;
                    }
                    output.push_str(&stderr_out);
                    let exit_code = status.code();
                    build_foreground_result(&output, exit_code, false, false, timeout_ms, pid)
                }
                Ok(None) => {
                    // Still running: leave it detached in the background.
                    tokio::spawn(async move {
                        let _ = child.wait().await;
                    });
                    let llm_content = format!("Command moved to background (PID: {}). Output hidden.", pid.unwrap_or(0));
                    ToolResult::ok_with_data(
                        llm_content.clone(),
                        llm_content,
                        json!({"pid": pid, "command": command, "backgrounded": true}),
                    )
                }
                Err(_) => build_foreground_result("", None, false, false, timeout_ms, pid),
            }
        } else {
            let mut cmd = spawn_command(command, &cwd);
            let child = match cmd.spawn() {
                Ok(c) => c,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return ToolResult::err(
                        format!("Command not found: bash ({e})"),
                        ToolErrorType::ShellNotFound,
                    )
                }
                Err(e) => {
                    return ToolResult::err(
                        format!("Error executing shell command: {e}"),
                        ToolErrorType::ShellExecuteError,
                    )
                }
            };
            let pid = child.id();
            let timeout = (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms));
            let (output, exit_code, timed_out) = stream_with_timeout(child, timeout).await;
            build_foreground_result(&output, exit_code, timed_out, timed_out, timeout_ms, pid)
        }
    }
}

fn build_foreground_result(
    output: &str,
    exit_code: Option<i32>,
    aborted: bool,
    timeout_triggered: bool,
    timeout_ms: u64,
    pid: Option<u32>,
) -> ToolResult {
    let mut llm_parts = Vec::new();
    let return_display;

    if aborted {
        if timeout_triggered {
            let minutes = timeout_ms as f64 / 60_000.0;
            llm_parts.push(format!(
                "Command was automatically cancelled because it exceeded the timeout of {minutes:.1} minutes without output."
            ));
            return_display = format!("Command timed out after {minutes:.1} minutes.");
        } else {
            llm_parts.push("Command was cancelled by user before it could complete.".to_string());
            return_display = "Command cancelled by user.".to_string();
        }
        if !output.trim().is_empty() {
            llm_parts.push(format!("Below is the output before it was cancelled:\n{output}"));
        } else {
            llm_parts.push("There was no output before it was cancelled.".to_string());
        }
    } else {
        llm_parts.push(format!("Output: {}", if output.is_empty() { "(empty)" } else { output }));
        if let Some(code) = exit_code {
            if code != 0 {
                llm_parts.push(format!("Exit Code: {code}"));
            }
        }
        if let Some(pid) = pid {
            llm_parts.push(format!("Process Group PGID: {pid}"));
        }
        return_display = if !output.trim().is_empty() {
            output.to_string()
        } else if let Some(code) = exit_code {
            if code != 0 {
                format!("Command exited with code: {code}")
            } else {
                "(empty)".to_string()
            }
        } else {
            "(empty)".to_string()
        };
    }

    let llm_content = llm_parts.join("\n");

    let is_error = aborted || exit_code.map(|c| c != 0).unwrap_or(false);
    if is_error {
        let mut result = ToolResult::err(llm_content.clone(), ToolErrorType::ShellExecuteError);
        result.return_display = return_display;
        result
    } else {
        ToolResult::ok_with_data(
            llm_content,
            return_display,
            json!({"exit_code": exit_code, "pid": pid}),
        )
    }
}

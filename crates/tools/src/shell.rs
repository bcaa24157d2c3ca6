//! Shell tool: execute system commands.
//!
//! Supports a command allowlist, a fixed blocklist of destructive
//! patterns, and a per-call timeout.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 120;
const MAX_STDOUT_CHARS: usize = 5000;
const MAX_STDERR_CHARS: usize = 2000;

const BLOCKED_PATTERNS: &[&str] = &[
    "rm -rf /",
    "mkfs",
    "dd if=",
    ":(){:|:&};:",
    "chmod -r 777 /",
    "shutdown",
    "reboot",
    "init 0",
    "init 6",
];

/// Sequences that chain, substitute, or redirect commands.
const SHELL_CONTROL: &[&str] = &[";", "&", "|", "`", "$(", ">", "<", "\n", "\r"];

/// Execute shell commands with safety constraints.
pub struct ShellExecTool {
    /// If non-empty, only these base commands are allowed.
    allowed_commands: Vec<String>,
}

impl ShellExecTool {
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    /// `Err` carries the denial reason. With an allowlist in place, shell
    /// control syntax is rejected so the base command is the only one run.
    fn check_allowlist(&self, command: &str) -> Result<(), String> {
        if self.allowed_commands.is_empty() {
            return Ok(());
        }
        if let Some(op) = SHELL_CONTROL.iter().find(|op| command.contains(**op)) {
            return Err(format!("Command contains shell control sequence {op:?}"));
        }
        let base_cmd = command.split_whitespace().next().unwrap_or("");
        if self.allowed_commands.iter().any(|a| a == base_cmd) {
            Ok(())
        } else {
            Err(format!("Command '{base_cmd}' not in allowlist"))
        }
    }

    fn blocked_pattern(command: &str) -> Option<&'static str> {
        let lower = command.to_lowercase();
        BLOCKED_PATTERNS.iter().copied().find(|p| lower.contains(p))
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize, note: &str) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}\n... ({note})", &text[..cut]),
        None => text.to_string(),
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Run a shell command and return its output. Use for system tasks like listing files, \
         checking processes, or running scripts."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute (e.g., 'ls -la', 'cat file.txt')"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 30, max: 120)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let command = arguments
            .get("command")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_secs = arguments
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .clamp(1, MAX_TIMEOUT_SECS);

        if let Err(reason) = self.check_allowlist(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell_exec".into(),
                reason,
            });
        }
        if let Some(pattern) = Self::blocked_pattern(command) {
            return Err(ToolError::PermissionDenied {
                tool_name: "shell_exec".into(),
                reason: format!("Command blocked for safety: contains '{pattern}'"),
            });
        }

        debug!(command = %command, timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
            .await
            .map_err(|_| ToolError::ExecutionFailed {
                tool_name: "shell_exec".into(),
                reason: format!("Command timed out after {timeout_secs}s"),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "shell_exec".into(),
                reason: e.to_string(),
            })?;

        let mut parts = Vec::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            parts.push(truncate_chars(
                stdout,
                MAX_STDOUT_CHARS,
                &format!("output truncated, {} bytes total", output.stdout.len()),
            ));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            parts.push(format!("STDERR:\n{}", truncate_chars(stderr, MAX_STDERR_CHARS, "stderr truncated")));
        }
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %command, exit_code = code, "Command failed");
            parts.push(format!("Exit code: {code}"));
        }

        if parts.is_empty() {
            Ok("(no output)".into())
        } else {
            Ok(parts.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn allowlist_check() {
        let tool = ShellExecTool::new(vec!["ls".into(), "cat".into(), "git".into()]);
        assert!(tool.check_allowlist("ls -la").is_ok());
        assert!(tool.check_allowlist("git status").is_ok());
        assert!(tool.check_allowlist("rm -rf /").is_err());
        assert!(tool.check_allowlist("sudo something").is_err());
    }

    #[test]
    fn empty_allowlist_allows_all() {
        let tool = ShellExecTool::new(vec![]);
        assert!(tool.check_allowlist("anything goes").is_ok());
        assert!(tool.check_allowlist("echo a; echo b").is_ok());
    }

    #[test]
    fn allowlist_rejects_chained_commands() {
        let tool = ShellExecTool::new(vec!["echo".into()]);
        let chained = [
            "echo hi; id -u",
            "echo hi && id -u",
            "echo hi & id -u",
            "echo hi | sh",
            "echo `id -u`",
            "echo $(id -u)",
            "echo hi > /tmp/out",
            "echo < /etc/passwd",
            "echo hi\nid -u",
            "echo hi\rid -u",
        ];
        for command in chained {
            let reason = tool.check_allowlist(command).unwrap_err();
            assert!(reason.contains("control sequence"), "{command:?}: {reason}");
        }
        assert!(tool.check_allowlist("echo 'plain words'").is_ok());
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 10, "x"), "héllo");
        assert_eq!(truncate_chars("héllo", 2, "cut"), "hé\n... (cut)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_echo() {
        let tool = ShellExecTool::new(vec![]);
        let out = tool.execute(args(json!({"command": "echo hello"}))).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_command_reports_exit_code() {
        let tool = ShellExecTool::new(vec![]);
        let out = tool
            .execute(args(json!({"command": "echo oops >&2; exit 4"})))
            .await
            .unwrap();
        assert!(out.contains("STDERR:\noops"));
        assert!(out.ends_with("Exit code: 4"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_command() {
        let tool = ShellExecTool::new(vec![]);
        assert_eq!(tool.execute(args(json!({"command": "true"}))).await.unwrap(), "(no output)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_enforced() {
        let tool = ShellExecTool::new(vec![]);
        let result = tool.execute(args(json!({"command": "sleep 5", "timeout": 1}))).await;
        assert!(matches!(result, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn disallowed_and_blocked_commands() {
        let tool = ShellExecTool::new(vec!["ls".into()]);
        let result = tool.execute(args(json!({"command": "rm -rf /"}))).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));

        let open = ShellExecTool::new(vec![]);
        let result = open.execute(args(json!({"command": "sudo shutdown now"}))).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_command_never_runs() {
        let tool = ShellExecTool::new(vec!["echo".into()]);
        let result = tool.execute(args(json!({"command": "echo hi; id -u"}))).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));

        let out = tool.execute(args(json!({"command": "echo hi"}))).await.unwrap();
        assert_eq!(out, "hi");
    }
}

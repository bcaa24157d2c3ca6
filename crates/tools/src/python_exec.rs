//! Python execution tool: run a code snippet in a child interpreter.
//!
//! The code is piped to `<interpreter> -` with a minimal environment, the
//! system temp dir as working directory, and a hard timeout.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::shell::truncate_chars;

pub const DEFAULT_INTERPRETER: &str = "python3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_OUTPUT_CHARS: usize = 4096;

pub struct PythonExecTool {
    interpreter: String,
    timeout: Duration,
}

impl PythonExecTool {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn failed(reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "python_execute".into(),
            reason,
        }
    }
}

impl Default for PythonExecTool {
    fn default() -> Self {
        Self::new(DEFAULT_INTERPRETER)
    }
}

#[async_trait]
impl Tool for PythonExecTool {
    fn name(&self) -> &str {
        "python_execute"
    }

    fn description(&self) -> &str {
        "Execute Python code and return the output. Code runs in a sandboxed subprocess with a 30-second timeout."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python code to execute"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let code = arguments
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        let workdir = std::env::temp_dir();
        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("HOME", &workdir)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .current_dir(&workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Self::failed(format!("failed to start {}: {e}", self.interpreter)))?;

        let stdin = child.stdin.take();
        let source = code.as_bytes().to_vec();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&source).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| Self::failed(format!("Code execution timed out after {} seconds", self.timeout.as_secs())))?;
        let output = output.map_err(|e| Self::failed(e.to_string()))?;
        if let Err(e) = fed {
            debug!(error = %e, "Interpreter closed stdin early");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut text = stdout.into_owned();
        if !stderr.is_empty() {
            if text.is_empty() {
                text = stderr.into_owned();
            } else {
                text.push_str("\n--- stderr ---\n");
                text.push_str(&stderr);
            }
        }
        let text = text.trim_end();

        info!(
            chars = text.chars().count(),
            exit_code = output.status.code().unwrap_or(-1),
            "Python exec finished"
        );
        if text.is_empty() {
            return Ok("(no output)".into());
        }
        Ok(truncate_chars(text, MAX_OUTPUT_CHARS, "truncated"))
    }
}

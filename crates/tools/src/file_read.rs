//! File read tool: read text files inside the sandbox.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};

use crate::sandbox::Sandbox;

const DEFAULT_MAX_LINES: usize = 200;
const MAX_FILE_BYTES: u64 = 1_000_000;

pub struct FileReadTool {
    sandbox: Sandbox,
}

impl FileReadTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Supports text, code, markdown, and other text-based files."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to read (relative to the workspace or absolute)"
                },
                "max_lines": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default: 200)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let max_lines = arguments
            .get("max_lines")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_MAX_LINES, |n| n as usize);

        let resolved = self.sandbox.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_read".into(),
            reason: e.to_string(),
        })?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "file_read".into(),
            reason,
        };

        let metadata = tokio::fs::metadata(&resolved)
            .await
            .map_err(|_| failed(format!("File not found: {path}")))?;
        if !metadata.is_file() {
            return Err(failed(format!("Not a file: {path}")));
        }
        if metadata.len() > MAX_FILE_BYTES {
            return Err(failed(format!("File too large ({} bytes). Max 1MB.", metadata.len())));
        }

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| failed(format!("Failed to read file: {e}")))?;
        let content = String::from_utf8_lossy(&bytes);

        let total = content.lines().count();
        if total > max_lines {
            let head: Vec<&str> = content.lines().take(max_lines).collect();
            return Ok(format!(
                "{}\n\n... ({} more lines truncated)",
                head.join("\n"),
                total - max_lines
            ));
        }
        Ok(content.into_owned())
    }
}

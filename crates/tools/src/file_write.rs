//! File write tool: create, overwrite, or append to files inside the sandbox.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;

use crate::sandbox::Sandbox;

pub struct FileWriteTool {
    sandbox: Sandbox,
}

impl FileWriteTool {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write or create a file with the given content. Creates parent directories if needed."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write (relative to the workspace or absolute)"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                },
                "mode": {
                    "type": "string",
                    "enum": ["write", "append"],
                    "description": "'write' (overwrite, default) or 'append'"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = match arguments.get("mode").and_then(Value::as_str) {
            None | Some("write") => false,
            Some("append") => true,
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown mode '{other}', expected 'write' or 'append'"
                )));
            }
        };

        let resolved = self.sandbox.resolve(path).map_err(|e| ToolError::PermissionDenied {
            tool_name: "file_write".into(),
            reason: e.to_string(),
        })?;

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: "file_write".into(),
            reason,
        };

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("Failed to create directory: {e}")))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&resolved)
            .await
            .map_err(|e| failed(format!("Failed to open file: {e}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| failed(format!("Failed to write file: {e}")))?;
        file.flush().await.map_err(|e| failed(e.to_string()))?;

        let action = if append { "Appended" } else { "Wrote" };
        Ok(format!("{action} {} bytes to {path}", content.len()))
    }
}

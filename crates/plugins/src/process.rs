//! Subprocess plugins.
//!
//! A bundle's `plugin` executable speaks two commands:
//!
//! - `plugin describe` prints a JSON document
//!   `{"name"?, "description"?, "version"?, "tools": [{"name", "description", "parameters"}]}`
//! - `plugin call <tool>` reads the JSON argument object from stdin and
//!   prints the result text on stdout. A non-zero exit status is a tool
//!   error; stderr becomes the reason.
//!
//! Both commands see the plugin's settings as a JSON object in the
//! `EMBER_PLUGIN_CONFIG` environment variable. Each invocation is killed
//! after the configured `timeout_secs` (default 60).

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::descriptor::PluginDescriptor;
use crate::error::PluginError;
use crate::plugin::{Plugin, PluginContext};
use crate::table::ToolSpec;

/// Environment variable carrying the plugin settings as JSON.
pub const CONFIG_ENV: &str = "EMBER_PLUGIN_CONFIG";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Description {
    name: Option<String>,
    description: Option<String>,
    version: Option<String>,
    #[serde(default)]
    tools: Vec<ToolSpec>,
}

pub struct ProcessPlugin {
    name: String,
    description: String,
    version: String,
    runner: Arc<Runner>,
    tools: Vec<Arc<dyn Tool>>,
}

/// How to start the bundle's executable.
struct Runner {
    executable: PathBuf,
    config_json: String,
    timeout: Duration,
}

impl Runner {
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(args).env(CONFIG_ENV, &self.config_json).kill_on_drop(true);
        cmd
    }
}

impl ProcessPlugin {
    pub fn new(descriptor: &PluginDescriptor, executable: PathBuf) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            version: descriptor.version.clone(),
            runner: Arc::new(Runner {
                executable,
                config_json: "{}".into(),
                timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            }),
            tools: Vec::new(),
        }
    }

    async fn describe(&self) -> Result<Description, PluginError> {
        let mut cmd = self.runner.command(&["describe"]);
        cmd.stdin(Stdio::null());
        let output = tokio::time::timeout(self.runner.timeout, cmd.output())
            .await
            .map_err(|_| PluginError::Process {
                name: self.name.clone(),
                reason: format!("describe timed out after {}s", self.runner.timeout.as_secs()),
            })?
            .map_err(|e| PluginError::CodeUnavailable {
                name: self.name.clone(),
                reason: format!("{}: {e}", self.runner.executable.display()),
            })?;

        if !output.status.success() {
            return Err(PluginError::Process {
                name: self.name.clone(),
                reason: format!(
                    "describe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| PluginError::Process {
            name: self.name.clone(),
            reason: format!("invalid describe output: {e}"),
        })
    }
}

#[async_trait]
impl Plugin for ProcessPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn version(&self) -> &str {
        &self.version
    }

    async fn on_load(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        let timeout_secs = ctx.setting::<u64>("timeout_secs")?.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1);
        let config_json = serde_json::to_string(ctx.config).map_err(|e| PluginError::InvalidConfig {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.runner = Arc::new(Runner {
            executable: self.runner.executable.clone(),
            config_json,
            timeout: Duration::from_secs(timeout_secs),
        });

        let description = self.describe().await?;

        // The manifest wins; describe output only fills gaps.
        if self.description.is_empty() {
            self.description = description.description.unwrap_or_default();
        }
        if let Some(version) = description.version.filter(|_| self.version == "0.1.0") {
            self.version = version;
        }
        if let Some(reported) = description.name.filter(|n| n != &self.name) {
            tracing::debug!(plugin = %self.name, reported = %reported, "Plugin process reports a different name");
        }

        self.tools = description
            .tools
            .into_iter()
            .map(|spec| {
                Arc::new(ProcessTool {
                    spec,
                    runner: Arc::clone(&self.runner),
                }) as Arc<dyn Tool>
            })
            .collect();
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), PluginError> {
        self.tools.clear();
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.clone()
    }
}

struct ProcessTool {
    spec: ToolSpec,
    runner: Arc<Runner>,
}

#[async_trait]
impl Tool for ProcessTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.spec.parameters.clone()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: self.spec.name.clone(),
            reason,
        };

        let mut child = self
            .runner
            .command(&["call", self.spec.name.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("failed to start plugin process: {e}")))?;

        let payload = serde_json::to_vec(&Value::Object(arguments)).map_err(|e| failed(e.to_string()))?;
        let stdin = child.stdin.take();
        // Stdin is fed while stdout drains; dropping it closes the pipe.
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async { tokio::join!(feed, child.wait_with_output()) };

        let (fed, output) = tokio::time::timeout(self.runner.timeout, run)
            .await
            .map_err(|_| failed(format!("plugin call timed out after {}s", self.runner.timeout.as_secs())))?;
        let output = output.map_err(|e| failed(e.to_string()))?;
        if let Err(e) = fed {
            tracing::debug!(tool = %self.spec.name, error = %e, "Plugin process stopped reading its input");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(failed(if stderr.is_empty() {
                format!("plugin process exited with {}", output.status)
            } else {
                stderr
            }));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

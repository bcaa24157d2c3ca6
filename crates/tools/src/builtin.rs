//! Built-in plugins and the catalog the host registers them in.

use async_trait::async_trait;
use ember_core::{KnowledgeSource, Provider, Tool};
use ember_plugins::{DeclarativePlugin, Plugin, PluginCatalog, PluginContext, PluginError, ToolSpec, ToolTable};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::calculator::CalculatorTool;
use crate::file_read::FileReadTool;
use crate::file_write::FileWriteTool;
use crate::knowledge_query::KnowledgeQueryTool;
use crate::python_exec::{DEFAULT_INTERPRETER, DEFAULT_TIMEOUT_SECS, PythonExecTool};
use crate::sandbox::Sandbox;
use crate::shell::ShellExecTool;
use crate::summarize::SummarizeTool;
use crate::system_stats::SystemStatsTool;

/// Collaborators injected into built-in plugins at construction time.
#[derive(Clone, Default)]
pub struct BuiltinServices {
    pub sandbox: Sandbox,
    pub knowledge: Option<Arc<dyn KnowledgeSource>>,
    pub summarizer: Option<SummarizeTool>,
}

impl BuiltinServices {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            ..Self::default()
        }
    }

    pub fn with_knowledge(mut self, source: Arc<dyn KnowledgeSource>) -> Self {
        self.knowledge = Some(source);
        self
    }

    /// Backend used by `summarize`.
    pub fn with_provider(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.summarizer = Some(SummarizeTool::new(provider, model));
        self
    }
}

/// Catalog of every built-in plugin, keyed by manifest entry.
///
/// `rag_tools` is only registered when a knowledge source is available,
/// `summarize` only when a provider is.
pub fn builtin_catalog(services: BuiltinServices) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog
        .register("calculator", || Box::new(CalculatorPlugin))
        .register("shell_exec", || Box::new(ShellExecPlugin::default()))
        .register("python_exec", || Box::new(PythonExecPlugin::default()))
        .register("system_stats", || {
            Box::new(SingleTool::new("system_stats", "Host CPU, memory, and uptime report", SystemStatsTool))
        })
        .register("hello_world", || Box::new(hello_world()));

    let sandbox = services.sandbox.clone();
    catalog.register("file_tools", move || Box::new(FileToolsPlugin::new(sandbox.clone())));

    if let Some(source) = services.knowledge {
        catalog.register("rag_tools", move || Box::new(RagToolsPlugin { source: Arc::clone(&source) }));
    }
    if let Some(summarizer) = services.summarizer {
        catalog.register("summarize", move || {
            Box::new(SingleTool::new("summarize", "LLM-powered text summarization", summarizer.clone()))
        });
    }
    catalog
}

/// A plugin wrapping exactly one stateless tool.
pub struct SingleTool {
    name: &'static str,
    description: &'static str,
    tool: Arc<dyn Tool>,
}

impl SingleTool {
    pub fn new(name: &'static str, description: &'static str, tool: impl Tool + 'static) -> Self {
        Self {
            name,
            description,
            tool: Arc::new(tool),
        }
    }
}

#[async_trait]
impl Plugin for SingleTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::clone(&self.tool)]
    }
}

pub struct CalculatorPlugin;

#[async_trait]
impl Plugin for CalculatorPlugin {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Mathematical calculations and expression evaluation"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(CalculatorTool)]
    }
}

/// `file_read` and `file_write` sharing one sandbox.
///
/// An `allowed_roots` list in the plugin config replaces the injected roots.
pub struct FileToolsPlugin {
    sandbox: Sandbox,
}

impl FileToolsPlugin {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Plugin for FileToolsPlugin {
    fn name(&self) -> &str {
        "file_tools"
    }

    fn description(&self) -> &str {
        "File read/write operations with path sandboxing"
    }

    async fn on_load(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        if let Some(roots) = ctx.setting::<Vec<PathBuf>>("allowed_roots")? {
            self.sandbox = Sandbox::new(roots);
        }
        tracing::debug!(roots = ?self.sandbox.roots(), "File tools sandbox configured");
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(FileReadTool::new(self.sandbox.clone())),
            Arc::new(FileWriteTool::new(self.sandbox.clone())),
        ]
    }
}

/// Shell access, configured with `allowed_commands` at load time.
#[derive(Default)]
pub struct ShellExecPlugin {
    tool: Option<Arc<ShellExecTool>>,
}

#[async_trait]
impl Plugin for ShellExecPlugin {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Shell command execution with safety checks"
    }

    async fn on_load(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        let allowed: Vec<String> = ctx.setting("allowed_commands")?.unwrap_or_default();
        if allowed.is_empty() {
            tracing::warn!("shell_exec loaded without an allowlist; only the blocklist applies");
        }
        self.tool = Some(Arc::new(ShellExecTool::new(allowed)));
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), PluginError> {
        self.tool = None;
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tool.iter().map(|t| Arc::clone(t) as Arc<dyn Tool>).collect()
    }
}

/// Python snippets, with `interpreter` and `timeout_secs` read at load time.
#[derive(Default)]
pub struct PythonExecPlugin {
    tool: Option<Arc<PythonExecTool>>,
}

#[async_trait]
impl Plugin for PythonExecPlugin {
    fn name(&self) -> &str {
        "python_exec"
    }

    fn description(&self) -> &str {
        "Python code execution in sandboxed environment"
    }

    async fn on_load(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        let interpreter: String = ctx.setting("interpreter")?.unwrap_or_else(|| DEFAULT_INTERPRETER.into());
        let timeout_secs: u64 = ctx.setting("timeout_secs")?.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1);
        tracing::debug!(interpreter = %interpreter, timeout_secs, "Python exec configured");
        self.tool = Some(Arc::new(
            PythonExecTool::new(interpreter).with_timeout(Duration::from_secs(timeout_secs)),
        ));
        Ok(())
    }

    async fn on_unload(&mut self) -> Result<(), PluginError> {
        self.tool = None;
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tool.iter().map(|t| Arc::clone(t) as Arc<dyn Tool>).collect()
    }
}

pub struct RagToolsPlugin {
    source: Arc<dyn KnowledgeSource>,
}

#[async_trait]
impl Plugin for RagToolsPlugin {
    fn name(&self) -> &str {
        "rag_tools"
    }

    fn description(&self) -> &str {
        "Knowledge base query tools"
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        vec![Arc::new(KnowledgeQueryTool::new(Arc::clone(&self.source)))]
    }
}

/// The example plugin: a single declarative `hello` tool.
pub fn hello_world() -> DeclarativePlugin {
    let spec = ToolSpec::new(
        "hello",
        "Says hello to the world.",
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Who to greet (default: World)"}
            }
        }),
    );
    let table = ToolTable::new().tool(spec, |args: Map<String, Value>| async move {
        let name = args.get("name").and_then(Value::as_str).unwrap_or("World");
        Ok(format!("Hello, {name}! The plugin system is working."))
    });
    DeclarativePlugin::new("hello_world", "A simple example plugin.", table)
}

//! Declarative tool tables: plugins that are a list of
//! `(name, description, schema, handler)` entries.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::plugin::Plugin;

/// Name, description, and JSON-schema parameters of one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

pub(crate) fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

type Handler = Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<String, ToolError>> + Send + Sync>;

/// A tool backed by an async closure.
pub struct FnTool {
    spec: ToolSpec,
    handler: Handler,
}

impl FnTool {
    pub fn new<F, Fut>(spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        Self {
            spec,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
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
        (self.handler)(arguments).await
    }
}

/// Ordered list of closure-backed tools.
#[derive(Default, Clone)]
pub struct ToolTable {
    tools: Vec<Arc<FnTool>>,
}

impl ToolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool<F, Fut>(mut self, spec: ToolSpec, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        self.tools.push(Arc::new(FnTool::new(spec, handler)));
        self
    }

    /// Add a tool whose handler receives a shared handle to `state`, the
    /// equivalent of a bound method on a plugin object.
    pub fn bound<S, F, Fut>(self, state: &Arc<S>, spec: ToolSpec, method: F) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(Arc<S>, Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let state = Arc::clone(state);
        self.tool(spec, move |args| method(Arc::clone(&state), args))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.iter().map(|t| Arc::clone(t) as Arc<dyn Tool>).collect()
    }
}

/// A plugin that is nothing more than a tool table.
pub struct DeclarativePlugin {
    name: String,
    description: String,
    version: String,
    table: ToolTable,
}

impl DeclarativePlugin {
    pub fn new(name: impl Into<String>, description: impl Into<String>, table: ToolTable) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: String::new(),
            table,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

#[async_trait]
impl Plugin for DeclarativePlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.table.tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        hits: AtomicUsize,
    }

    #[tokio::test]
    async fn table_tools_execute() {
        let table = ToolTable::new().tool(
            ToolSpec::new("echo", "Echo text", json!({"type": "object"})),
            |args| async move { Ok(args.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string()) },
        );
        let tools = table.tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name(), "echo");

        let mut args = Map::new();
        args.insert("text".into(), json!("hi"));
        assert_eq!(tools[0].execute(args).await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn bound_handlers_share_state() {
        let counter = Arc::new(Counter { hits: AtomicUsize::new(0) });
        let table = ToolTable::new().bound(
            &counter,
            ToolSpec::new("hit", "Count a hit", empty_object_schema()),
            |c, _args| async move {
                let n = c.hits.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(n.to_string())
            },
        );
        let tool = table.tools().remove(0);
        tool.execute(Map::new()).await.unwrap();
        assert_eq!(tool.execute(Map::new()).await.unwrap(), "2");
        assert_eq!(counter.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tool_spec_defaults_on_deserialize() {
        let spec: ToolSpec = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert_eq!(spec.description, "");
        assert_eq!(spec.parameters["type"], "object");
    }

    #[test]
    fn declarative_plugin_metadata() {
        let plugin = DeclarativePlugin::new("demo", "Demo plugin", ToolTable::new()).with_version("2.0.0");
        assert_eq!(plugin.name(), "demo");
        assert_eq!(plugin.version(), "2.0.0");
        assert!(plugin.tools().is_empty());
    }
}

//! Tool trait, the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! evaluate expressions, read files, query a knowledge base, etc.
//! Plugins produce them; the [`ToolRegistry`] catalogs them by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Tool-call arguments as they arrive from a model.
///
/// Prompt-parsed calls always carry a JSON object; native function calling
/// backends often hand over a string-encoded blob instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arguments {
    Json(Map<String, Value>),
    Raw(String),
}

impl Arguments {
    /// Normalize to an argument map. Called once, right before execution.
    ///
    /// A raw string that is not a JSON object yields an empty map.
    pub fn into_map(self) -> Map<String, Value> {
        match self {
            Self::Json(map) => map,
            Self::Raw(raw) => {
                if raw.trim().is_empty() {
                    return Map::new();
                }
                match serde_json::from_str::<Value>(&raw) {
                    Ok(Value::Object(map)) => map,
                    Ok(other) => {
                        warn!(kind = %json_kind(&other), "Tool arguments are not an object, using empty map");
                        Map::new()
                    }
                    Err(e) => {
                        warn!(error = %e, "Unparsable tool arguments, using empty map");
                        Map::new()
                    }
                }
            }
        }
    }

    /// Arguments as a JSON value, for event payloads.
    pub fn to_value(&self) -> Value {
        Value::Object(self.clone().into_map())
    }
}

impl Default for Arguments {
    fn default() -> Self {
        Self::Json(Map::new())
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(map: Map<String, Value>) -> Self {
        Self::Json(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A request from the model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call ID; generated when the model did not supply one
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    pub arguments: Arguments,
}

impl ToolCallRequest {
    pub fn new(name: impl Into<String>, arguments: impl Into<Arguments>) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Introspection record for UIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub parameter_schema: Value,
}

/// The core Tool trait.
///
/// Tools are stateless from the registry's point of view. A tool that needs
/// a collaborator (a knowledge source, a sandbox root) receives it at
/// construction time.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator", "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameter_schema: self.parameters_schema(),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Shared as `Arc<ToolRegistry>` between conversations. The lock is only
/// held for map access, never across a tool execution.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Tool>>> {
        self.tools.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.write().insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool is already registered, overwriting");
        } else {
            info!(tool = %name, "Registered tool");
        }
    }

    /// Remove a tool by name. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All registered tools, sorted by name.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools: Vec<_> = self.read().values().cloned().collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// List all registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get all tool definitions (for sending to the LLM).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools().iter().map(|t| t.to_definition()).collect()
    }

    /// Registry export for UI/introspection.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools().iter().map(|t| t.info()).collect()
    }

    /// Look up and execute a tool.
    pub async fn execute(&self, name: &str, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(arguments).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// A simple test tool whose output identifies the instance.
    struct EchoTool {
        name: &'static str,
        tag: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
            let text = arguments.get("text").and_then(Value::as_str).unwrap_or("");
            Ok(format!("{}:{text}", self.tag))
        }
    }

    fn echo(name: &'static str, tag: &'static str) -> Arc<dyn Tool> {
        Arc::new(EchoTool { name, tag })
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = ToolRegistry::new();
        registry.register(echo("echo", "a"));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert!(registry.contains("echo"));
    }

    #[tokio::test]
    async fn duplicate_names_keep_most_recent() {
        let registry = ToolRegistry::new();
        let sequence = [("a", "1"), ("b", "1"), ("a", "2"), ("c", "1"), ("b", "2"), ("a", "3")];
        for (name, tag) in sequence {
            registry.register(echo(name, tag));
        }
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names(), vec!["a", "b", "c"]);

        let out = registry.execute("a", Map::new()).await.unwrap();
        assert_eq!(out, "3:");
        let out = registry.execute("b", Map::new()).await.unwrap();
        assert_eq!(out, "2:");
    }

    #[test]
    fn unregister_removes_tool() {
        let registry = ToolRegistry::new();
        registry.register(echo("echo", "a"));
        assert!(registry.unregister("echo"));
        assert!(!registry.unregister("echo"));
        assert!(registry.is_empty());
    }

    #[test]
    fn list_tools_exports_schema() {
        let registry = ToolRegistry::new();
        registry.register(echo("zeta", "z"));
        registry.register(echo("alpha", "a"));
        let infos = registry.list_tools();
        assert_eq!(infos[0].name, "alpha");
        assert_eq!(infos[1].name, "zeta");
        assert_eq!(infos[0].parameter_schema["required"], json!(["text"]));
        assert_eq!(registry.definitions().len(), 2);
    }

    #[tokio::test]
    async fn registry_execute_tool() {
        let registry = ToolRegistry::new();
        registry.register(echo("echo", "x"));
        let mut args = Map::new();
        args.insert("text".into(), json!("hello world"));
        let out = registry.execute("echo", args).await.unwrap();
        assert_eq!(out, "x:hello world");
    }

    #[tokio::test]
    async fn registry_execute_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("nonexistent", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn raw_arguments_normalize_to_map() {
        let args = Arguments::Raw(r#"{"expression":"2+2"}"#.into());
        assert_eq!(args.into_map().get("expression"), Some(&json!("2+2")));
        assert!(Arguments::Raw("not json".into()).into_map().is_empty());
        assert!(Arguments::Raw("[1,2]".into()).into_map().is_empty());
        assert!(Arguments::Raw(String::new()).into_map().is_empty());
    }

    #[test]
    fn arguments_deserialize_untagged() {
        let structured: Arguments = serde_json::from_value(json!({"a": 1})).unwrap();
        assert!(matches!(structured, Arguments::Json(_)));
        let raw: Arguments = serde_json::from_value(json!("{\"a\":1}")).unwrap();
        assert!(matches!(raw, Arguments::Raw(_)));
    }

    #[test]
    fn call_ids_are_unique() {
        let a = ToolCallRequest::new("x", Map::new());
        let b = ToolCallRequest::new("x", Map::new());
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}

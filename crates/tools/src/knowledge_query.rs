//! Knowledge query tool: forwards to an injected [`KnowledgeSource`].

use async_trait::async_trait;
use ember_core::{KnowledgeSource, Tool, ToolError};
use serde_json::{Map, Value};
use std::sync::Arc;

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 20;

pub struct KnowledgeQueryTool {
    source: Arc<dyn KnowledgeSource>,
}

impl KnowledgeQueryTool {
    pub fn new(source: Arc<dyn KnowledgeSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Tool for KnowledgeQueryTool {
    fn name(&self) -> &str {
        "knowledge_query"
    }

    fn description(&self) -> &str {
        "Search the knowledge base (documents, PDFs, notes) for information relevant to a question. \
         Use this when the user asks about their uploaded documents or stored knowledge."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The question or search query to find relevant documents"
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return (default: 5)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let top_k = arguments
            .get("top_k")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_TOP_K, |k| k as usize)
            .clamp(1, MAX_TOP_K);

        self.source
            .query(query, top_k)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "knowledge_query".into(),
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::KnowledgeError;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSource {
        calls: Mutex<Vec<(String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl KnowledgeSource for RecordingSource {
        async fn query(&self, text: &str, top_k: usize) -> Result<String, KnowledgeError> {
            self.calls.lock().unwrap().push((text.to_string(), top_k));
            if self.fail {
                return Err(KnowledgeError::Unavailable("index not built".into()));
            }
            Ok(format!("[1] passage about {text}"))
        }
    }

    #[tokio::test]
    async fn forwards_query_and_top_k() {
        let source = Arc::new(RecordingSource::default());
        let tool = KnowledgeQueryTool::new(source.clone());

        let args = json!({"query": "  rust traits ", "top_k": 500}).as_object().cloned().unwrap();
        let out = tool.execute(args).await.unwrap();
        assert_eq!(out, "[1] passage about rust traits");
        assert_eq!(source.calls.lock().unwrap()[0], ("rust traits".to_string(), MAX_TOP_K));
    }

    #[tokio::test]
    async fn source_failure_is_execution_error() {
        let source = Arc::new(RecordingSource { fail: true, ..Default::default() });
        let tool = KnowledgeQueryTool::new(source);
        let args = json!({"query": "anything"}).as_object().cloned().unwrap();
        assert!(matches!(tool.execute(args).await, Err(ToolError::ExecutionFailed { .. })));
    }

    #[tokio::test]
    async fn empty_query_rejected() {
        let tool = KnowledgeQueryTool::new(Arc::new(RecordingSource::default()));
        assert!(matches!(tool.execute(Map::new()).await, Err(ToolError::InvalidArguments(_))));
    }
}

//! Summarize tool: asks the generation backend to condense text.

use async_trait::async_trait;
use ember_core::{Message, Provider, ProviderRequest, Tool, ToolError};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Input beyond this many characters is cut before it reaches the model.
const MAX_INPUT_CHARS: usize = 8000;
const SUMMARY_TEMPERATURE: f32 = 0.3;
const EMPTY_SUMMARY: &str = "Failed to generate summary.";

#[derive(Clone)]
pub struct SummarizeTool {
    provider: Arc<dyn Provider>,
    model: String,
}

impl SummarizeTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

fn style_instruction(style: &str) -> &'static str {
    match style {
        "detailed" => "Provide a detailed paragraph summary covering all key points.",
        "bullets" => "Provide a summary as bullet points covering the main ideas.",
        _ => "Provide a concise 2-3 sentence summary.",
    }
}

#[async_trait]
impl Tool for SummarizeTool {
    fn name(&self) -> &str {
        "summarize"
    }

    fn description(&self) -> &str {
        "Summarize a long piece of text into a concise version. Useful for condensing articles, \
         documents, or conversation history."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The text to summarize"
                },
                "style": {
                    "type": "string",
                    "description": "Summary style: 'brief' (2-3 sentences), 'detailed' (paragraph), or 'bullets' (bullet points). Default: 'brief'"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
        let style = arguments.get("style").and_then(Value::as_str).unwrap_or("brief");

        let excerpt = match text.char_indices().nth(MAX_INPUT_CHARS) {
            Some((cut, _)) => &text[..cut],
            None => text,
        };
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(format!(
                    "You are a summarization assistant. {}",
                    style_instruction(style)
                )),
                Message::user(format!("Summarize the following text:\n\n{excerpt}")),
            ],
            temperature: SUMMARY_TEMPERATURE,
            max_tokens: None,
            tools: vec![],
            stream: false,
        };

        let response = self.provider.complete(request).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "summarize".into(),
            reason: e.to_string(),
        })?;
        let summary = response.content.trim();
        Ok(if summary.is_empty() { EMPTY_SUMMARY.to_string() } else { summary.to_string() })
    }
}

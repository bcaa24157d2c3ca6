//! Provider trait, the abstraction over text-generation backends.
//!
//! A Provider knows how to send a conversation to an LLM and get a response
//! back, either as a complete message or as a stream of text chunks.
//! Concrete HTTP clients live outside this workspace; the agent loop only
//! ever sees this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCallRequest;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "qwen3:8b")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the backend may call natively (empty when prompt-based calling is used)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A complete (non-streaming) response from a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text
    pub content: String,

    /// Native tool calls, for backends that support function calling
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

impl ProviderResponse {
    /// A plain text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: String,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
}

pub type ChunkReceiver = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// The core Provider trait.
///
/// Every LLM backend (Ollama, llama.cpp, OpenAI-compatible) implements this trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a single chunk.
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let response = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: response.content,
                done: true,
                tokens_used: response.tokens_used,
            }))
            .await;
        Ok(rx)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider;

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: "hello".into(),
                tokens_used: Some(3),
                ..ProviderResponse::default()
            })
        }
    }

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "m".into(),
            messages: vec![Message::user("hi")],
            temperature: default_temperature(),
            max_tokens: None,
            tools: vec![],
            stream: true,
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let mut rx = FixedProvider.stream(request()).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content, "hello");
        assert!(chunk.done);
        assert_eq!(chunk.tokens_used, Some(3));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn request_defaults() {
        let req: ProviderRequest = serde_json::from_str(r#"{"model":"m","messages":[]}"#).unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!req.stream);
        assert!(req.tools.is_empty());
    }
}

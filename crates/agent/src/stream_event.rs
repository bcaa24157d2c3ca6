//! Agent-level streaming events.
//!
//! Transports (SSE, WebSocket, a terminal) forward these verbatim; the
//! `type` tag doubles as the SSE event name.

use serde::{Deserialize, Serialize};

/// Events emitted by the agent and the stream segmenter:
/// - `token`: visible answer text
/// - `thinking`: one complete reasoning region
/// - `tool_call`: the agent is invoking a tool
/// - `tool_result`: tool execution completed
/// - `error`: the backend failed
/// - `done`: always the last event of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { content: String },

    Thinking { content: String },

    ToolCall { name: String, args: serde_json::Value },

    ToolResult { name: String, result: String },

    Error { message: String },

    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens_used: Option<u32>,
    },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Error { .. } => "error",
            Self::Done { .. } => "done",
        }
    }

    pub fn token(content: impl Into<String>) -> Self {
        Self::Token { content: content.into() }
    }

    pub fn thinking(content: impl Into<String>) -> Self {
        Self::Thinking { content: content.into() }
    }
}

//! # Ember Core
//!
//! Domain types, traits, and error definitions for the Ember agent runtime.
//! Every other crate in the workspace depends inward on this one.
//!
//! ## What lives here
//!
//! - [`Message`] and [`Role`], the conversation history the agent loop appends to
//! - [`Tool`] and [`ToolRegistry`], the capability catalog shared by every conversation
//! - [`Provider`], the boundary to a text-generation backend
//! - [`KnowledgeSource`], the boundary to a retrieval pipeline
//! - [`EventBus`], broadcast of domain events (plugin lifecycle, tool runs)

pub mod error;
pub mod event;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, KnowledgeError, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use knowledge::KnowledgeSource;
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition};
pub use tool::{Arguments, Tool, ToolCallRequest, ToolInfo, ToolRegistry};

//! The agent runtime: prompt-based tool calling, the bounded
//! probe/execute loop, and incremental stream segmentation.
//!
//! A run follows a **Probe → Execute → Answer** cycle:
//!
//! 1. **Inject** tool descriptions into the system prompt
//! 2. **Probe** the provider with the accumulated history
//! 3. **If tool calls**: execute them, append results, probe again
//! 4. **If text only**: that text is the answer
//!
//! The loop stops at the first plain answer or after the configured number
//! of executed rounds, whichever comes first.

pub mod loop_runner;
pub mod protocol;
pub mod segmenter;
pub mod stream_event;

pub use loop_runner::{AgentError, AgentLoop, AgentOutcome, AgentPhase};
pub use protocol::{ParsedResponse, build_tool_descriptions, format_tool_call, inject, parse, strip_reasoning};
pub use segmenter::{Markers, StreamSegmenter};
pub use stream_event::StreamEvent;

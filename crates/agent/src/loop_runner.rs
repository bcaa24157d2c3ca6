//! The bounded probe/execute loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ember_config::AgentConfig;
use ember_core::error::ProviderError;
use ember_core::event::{DomainEvent, EventBus};
use ember_core::message::{Message, Role};
use ember_core::provider::{Provider, ProviderRequest};
use ember_core::tool::{ToolCallRequest, ToolRegistry};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::protocol::{self, TOOL_PROMPT_HEADER};
use crate::segmenter::{Markers, StreamSegmenter};
use crate::stream_event::StreamEvent;

/// Where a run currently is. `Answering` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Probing,
    Executing,
    Answering,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Run cancelled: event receiver dropped")]
    Cancelled,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    pub answer: String,
    /// Executed probe/execute rounds
    pub iterations: u32,
    pub tool_calls_made: usize,
    pub tokens_used: Option<u32>,
    /// The iteration cap ended the run while the model still requested tools
    pub capped: bool,
}

/// One generated response, already split for the loop.
#[derive(Debug, Default)]
struct Round {
    /// Reply with reasoning regions removed, before tool-call parsing
    text: String,
    visible: String,
    reasoning: Option<String>,
    requests: Vec<ToolCallRequest>,
    tokens_used: Option<u32>,
}

type EventSink<'a> = Option<&'a UnboundedSender<StreamEvent>>;

fn emit(sink: EventSink<'_>, event: StreamEvent) {
    if let Some(tx) = sink {
        let _ = tx.send(event);
    }
}

fn add_tokens(total: Option<u32>, more: Option<u32>) -> Option<u32> {
    match (total, more) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0).saturating_add(b.unwrap_or(0))),
    }
}

/// The agent loop: probe the backend, execute requested tools, repeat
/// until a plain answer or the iteration cap.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,

    model: String,

    temperature: f32,

    max_tokens: Option<u32>,

    tools: Arc<ToolRegistry>,

    /// Maximum executed rounds per run
    max_iterations: u32,

    /// Base system prompt, used when the history has none
    system_prompt: String,

    tools_enabled: bool,

    markers: Markers,

    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        let defaults = AgentConfig::default();
        Self {
            provider,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: None,
            tools,
            max_iterations: defaults.max_iterations,
            system_prompt: defaults.system_prompt,
            tools_enabled: true,
            markers: Markers::default(),
            event_bus: None,
        }
    }

    /// Apply every setting from an `[agent]` config section, model included.
    pub fn with_config(mut self, config: &AgentConfig) -> Self {
        self.model = config.model.clone();
        self.temperature = config.temperature;
        self.max_tokens = config.max_tokens;
        self.max_iterations = config.max_iterations;
        self.system_prompt = config.system_prompt.clone();
        self.tools_enabled = config.tools_enabled;
        self
    }

    /// Set the maximum number of executed tool rounds.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_markers(mut self, markers: Markers) -> Self {
        self.markers = markers;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Run to completion without emitting events.
    pub async fn run(&self, messages: &mut Vec<Message>) -> Result<AgentOutcome, AgentError> {
        self.drive(messages, None, false).await
    }

    /// Run with complete (non-streaming) probes, reporting progress as events.
    pub async fn run_with_events(
        &self,
        messages: &mut Vec<Message>,
        events: &UnboundedSender<StreamEvent>,
    ) -> Result<AgentOutcome, AgentError> {
        self.drive(messages, Some(events), false).await
    }

    /// Run with streamed probes; tokens and reasoning are forwarded as they
    /// arrive.
    pub async fn run_streaming(
        &self,
        messages: &mut Vec<Message>,
        events: &UnboundedSender<StreamEvent>,
    ) -> Result<AgentOutcome, AgentError> {
        self.drive(messages, Some(events), true).await
    }

    async fn drive(
        &self,
        messages: &mut Vec<Message>,
        sink: EventSink<'_>,
        streaming: bool,
    ) -> Result<AgentOutcome, AgentError> {
        info!(messages = messages.len(), streaming, "Processing conversation");
        self.prepare_system_prompt(messages);

        let mut phase = AgentPhase::Probing;
        let mut round = Round::default();
        let mut iterations = 0;
        let mut tool_calls_made = 0;
        let mut tokens_used = None;
        let mut capped = false;

        loop {
            match phase {
                AgentPhase::Probing => {
                    if sink.is_some_and(|tx| tx.is_closed()) {
                        info!(iterations, "Event receiver dropped, stopping run");
                        return Err(AgentError::Cancelled);
                    }
                    debug!(iteration = iterations + 1, "Agent loop probe");

                    let probed = if streaming {
                        self.probe_streaming(messages, sink).await
                    } else {
                        self.probe(messages).await.map_err(AgentError::from)
                    };
                    round = match probed {
                        Ok(round) => round,
                        Err(AgentError::Provider(e)) => {
                            warn!(error = %e, "Provider request failed");
                            emit(sink, StreamEvent::Error { message: e.to_string() });
                            return Err(AgentError::Provider(e));
                        }
                        Err(e) => return Err(e),
                    };
                    tokens_used = add_tokens(tokens_used, round.tokens_used);

                    phase = if round.requests.is_empty() {
                        AgentPhase::Answering
                    } else if iterations >= self.max_iterations {
                        warn!(
                            iterations,
                            pending = round.requests.len(),
                            "Max tool iterations reached, returning last response"
                        );
                        capped = true;
                        AgentPhase::Answering
                    } else {
                        AgentPhase::Executing
                    };
                }

                AgentPhase::Executing => {
                    iterations += 1;
                    debug!(iteration = iterations, tool_count = round.requests.len(), "Executing tool calls");
                    for request in std::mem::take(&mut round.requests) {
                        self.execute_request(messages, &round.text, request, sink).await;
                        tool_calls_made += 1;
                    }
                    phase = AgentPhase::Probing;
                }

                AgentPhase::Answering => {
                    let answer = if capped {
                        round.text.trim().to_string()
                    } else {
                        std::mem::take(&mut round.visible)
                    };
                    if !streaming {
                        if let Some(reasoning) = round.reasoning.take() {
                            emit(sink, StreamEvent::thinking(reasoning));
                        }
                        if !answer.is_empty() {
                            emit(sink, StreamEvent::token(answer.clone()));
                        }
                    }
                    emit(sink, StreamEvent::Done { tokens_used });
                    messages.push(Message::assistant(answer.clone()));

                    info!(iterations, tool_calls_made, capped, "Agent run complete");
                    return Ok(AgentOutcome {
                        answer,
                        iterations,
                        tool_calls_made,
                        tokens_used,
                        capped,
                    });
                }
            }
        }
    }

    /// Put the tool instructions into the system message, creating one from
    /// the base prompt when the history starts without it.
    fn prepare_system_prompt(&self, messages: &mut Vec<Message>) {
        let with_tools = self.tools_enabled && !self.tools.is_empty();

        match messages.first_mut() {
            Some(first) if first.role == Role::System => {
                if with_tools && !first.content.contains(TOOL_PROMPT_HEADER) {
                    first.content = protocol::inject(&first.content, &self.tools);
                }
            }
            _ => {
                let content = if with_tools {
                    protocol::inject(&self.system_prompt, &self.tools)
                } else {
                    self.system_prompt.clone()
                };
                messages.insert(0, Message::system(content));
            }
        }
    }

    fn request(&self, messages: &[Message], stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: vec![],
            stream,
        }
    }

    fn publish_usage(&self, model: &str, tokens_used: Option<u32>) {
        if let (Some(bus), Some(tokens_used)) = (&self.event_bus, tokens_used) {
            bus.publish(DomainEvent::ResponseGenerated {
                model: if model.is_empty() { self.model.clone() } else { model.to_string() },
                tokens_used,
                timestamp: Utc::now(),
            });
        }
    }

    async fn probe(&self, messages: &[Message]) -> Result<Round, ProviderError> {
        let response = self.provider.complete(self.request(messages, false)).await?;
        self.publish_usage(&response.model, response.tokens_used);

        let (reasoning, text) =
            protocol::split_reasoning(&response.content, &self.markers.think_open, &self.markers.think_close);

        if !response.tool_calls.is_empty() {
            return Ok(Round {
                visible: text.trim().to_string(),
                text,
                reasoning,
                requests: response.tool_calls,
                tokens_used: response.tokens_used,
            });
        }

        let parsed = protocol::parse(&text);
        let (requests, visible) = match parsed.requests {
            Some(requests) => (requests, parsed.visible_text),
            None => (Vec::new(), text.trim().to_string()),
        };
        Ok(Round {
            text,
            visible,
            reasoning,
            requests,
            tokens_used: response.tokens_used,
        })
    }

    async fn probe_streaming(&self, messages: &[Message], sink: EventSink<'_>) -> Result<Round, AgentError> {
        let mut chunks = self.provider.stream(self.request(messages, true)).await?;
        let mut segmenter = StreamSegmenter::new(self.markers.clone());
        let mut raw = String::new();
        let mut round = Round::default();

        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            raw.push_str(&chunk.content);
            if chunk.tokens_used.is_some() {
                round.tokens_used = chunk.tokens_used;
            }
            let events = segmenter.push(&chunk.content);
            forward(events, &mut round, sink)?;
            if chunk.done {
                break;
            }
        }
        let events = segmenter.finish(round.tokens_used);
        forward(events, &mut round, sink)?;
        self.publish_usage("", round.tokens_used);

        round.text = protocol::split_reasoning(&raw, &self.markers.think_open, &self.markers.think_close).1;
        round.visible = round.visible.trim().to_string();

        // The segmenter only sees fences; unfenced JSON calls show up once the
        // whole reply is known. Their text has already streamed as tokens.
        if round.requests.is_empty()
            && let Some(requests) = protocol::parse(&round.text).requests
        {
            debug!(count = requests.len(), "Recovered unfenced tool calls from streamed reply");
            round.requests = requests;
        }
        Ok(round)
    }

    async fn execute_request(
        &self,
        messages: &mut Vec<Message>,
        text: &str,
        request: ToolCallRequest,
        sink: EventSink<'_>,
    ) {
        messages.push(Message::assistant(text).with_tool_calls(vec![request.clone()]));

        let arguments = request.arguments.clone().into_map();
        emit(
            sink,
            StreamEvent::ToolCall {
                name: request.name.clone(),
                args: Value::Object(arguments.clone()),
            },
        );

        let start = Instant::now();
        let (result, success) = match self.tools.get(&request.name) {
            None => {
                warn!(tool = %request.name, "Model requested an unknown tool");
                (format!("Tool '{}' not found.", request.name), false)
            }
            Some(tool) => match tool.execute(arguments).await {
                Ok(output) => (output, true),
                Err(e) => {
                    warn!(tool = %request.name, error = %e, "Tool execution failed");
                    (format!("Error executing tool '{}': {e}", request.name), false)
                }
            },
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %request.name, success, duration_ms, "Tool call finished");

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: request.name.clone(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        emit(
            sink,
            StreamEvent::ToolResult {
                name: request.name.clone(),
                result: result.clone(),
            },
        );
        messages.push(Message::tool_result(&request, result));
    }
}

/// Route segmenter events: text goes out live, tool calls are held for the
/// executing phase, per-round `done` is dropped.
fn forward(events: Vec<StreamEvent>, round: &mut Round, sink: EventSink<'_>) -> Result<(), AgentError> {
    for event in events {
        match event {
            StreamEvent::ToolCall { name, args } => {
                let arguments = match args {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                round.requests.push(ToolCallRequest::new(name, arguments));
            }
            StreamEvent::Done { .. } => {}
            event => {
                match &event {
                    StreamEvent::Token { content } => round.visible.push_str(content),
                    StreamEvent::Thinking { content } => {
                        round.reasoning = Some(match round.reasoning.take() {
                            Some(prev) => format!("{prev}\n\n{content}"),
                            None => content.clone(),
                        });
                    }
                    _ => {}
                }
                if let Some(tx) = sink
                    && tx.send(event).is_err()
                {
                    return Err(AgentError::Cancelled);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ember_core::provider::{ChunkReceiver, ProviderResponse, StreamChunk};
    use ember_core::tool::Tool;
    use ember_core::ToolError;
    use serde_json::{Map, json};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Replays canned replies; repeats the last one when the script runs out.
    struct ScriptedProvider {
        replies: Mutex<VecDeque<ProviderResponse>>,
        last: Mutex<Option<ProviderResponse>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Self::with_responses(replies.iter().map(|r| ProviderResponse::text(*r)).collect())
        }

        fn with_responses(replies: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                last: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn next(&self, request: ProviderRequest) -> ProviderResponse {
            self.requests.lock().unwrap().push(request);
            let mut last = self.last.lock().unwrap();
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                *last = Some(reply);
            }
            last.clone().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(self.next(request))
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            let reply = self.next(request);
            let chars: Vec<char> = reply.content.chars().collect();
            let (tx, rx) = mpsc::channel(chars.len() + 1);
            for piece in chars.chunks(3) {
                let _ = tx.try_send(Ok(StreamChunk {
                    content: piece.iter().collect(),
                    done: false,
                    tokens_used: None,
                }));
            }
            let _ = tx.try_send(Ok(StreamChunk {
                content: String::new(),
                done: true,
                tokens_used: reply.tokens_used,
            }));
            Ok(rx)
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    struct AddTool;

    #[async_trait]
    impl Tool for AddTool {
        fn name(&self) -> &str {
            "calculator"
        }
        fn description(&self) -> &str {
            "Adds a and b"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}})
        }
        async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
            let a = arguments.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = arguments.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(format!("{}", a + b))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
        async fn execute(&self, _arguments: Map<String, Value>) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(AddTool));
        registry.register(Arc::new(BrokenTool));
        Arc::new(registry)
    }

    const ADD_CALL: &str = "```tool_call\n{\"name\": \"calculator\", \"arguments\": {\"a\": 2, \"b\": 2}}\n```";

    fn drain(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn simple_text_response() {
        let provider = ScriptedProvider::new(&["Hello! How can I help?"]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());

        let mut messages = vec![Message::user("Hello!")];
        let outcome = agent.run(&mut messages).await.unwrap();

        assert_eq!(outcome.answer, "Hello! How can I help?");
        assert_eq!(outcome.iterations, 0);
        assert!(!outcome.capped);
        // System + User + Assistant
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains(TOOL_PROMPT_HEADER));
        assert!(messages[0].content.contains("**calculator**"));
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let provider = ScriptedProvider::new(&[ADD_CALL, "The answer is 4."]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut messages = vec![Message::system("Be brief."), Message::user("What is 2+2?")];
        let outcome = agent.run_with_events(&mut messages, &tx).await.unwrap();

        assert_eq!(outcome.answer, "The answer is 4.");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tool_calls_made, 1);
        assert_eq!(provider.calls(), 2);

        assert!(messages[0].content.starts_with("Be brief.\n\n"));
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(messages[2].tool_calls[0].name, "calculator");
        assert_eq!(messages[2].content, ADD_CALL);
        assert_eq!(messages[3].content, "4");
        assert_eq!(messages[3].tool_call_id.as_deref(), Some(messages[2].tool_calls[0].id.as_str()));

        assert_eq!(
            drain(rx),
            vec![
                StreamEvent::ToolCall { name: "calculator".into(), args: json!({"a": 2, "b": 2}) },
                StreamEvent::ToolResult { name: "calculator".into(), result: "4".into() },
                StreamEvent::token("The answer is 4."),
                StreamEvent::Done { tokens_used: None },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_to_model() {
        let call = "```tool_call\n{\"name\": \"foo\", \"arguments\": {}}\n```";
        let provider = ScriptedProvider::new(&[call, "Sorry, I can't do that."]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());

        let mut messages = vec![Message::user("use foo")];
        let outcome = agent.run(&mut messages).await.unwrap();

        assert_eq!(outcome.answer, "Sorry, I can't do that.");
        let tool_msg = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "Tool 'foo' not found.");
        assert_eq!(tool_msg.name.as_deref(), Some("foo"));
        // The follow-up probe saw the error
        let second = &provider.requests.lock().unwrap()[1];
        assert!(second.messages.iter().any(|m| m.content == "Tool 'foo' not found."));
    }

    #[tokio::test]
    async fn tool_failure_becomes_result_text() {
        let call = "```tool_call\n{\"name\": \"broken\", \"arguments\": {}}\n```";
        let provider = ScriptedProvider::new(&[call, "It failed."]);
        let bus = Arc::new(EventBus::new(16));
        let mut bus_rx = bus.subscribe();
        let agent = AgentLoop::new(provider, "mock-model", registry()).with_event_bus(bus);

        let mut messages = vec![Message::user("break it")];
        agent.run(&mut messages).await.unwrap();

        let tool_msg = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(
            tool_msg.content,
            "Error executing tool 'broken': Tool execution failed: broken: disk on fire"
        );

        let event = bus_rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "broken");
                assert!(!success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn iteration_cap_returns_last_response() {
        let provider = ScriptedProvider::new(&[ADD_CALL]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry()).with_max_iterations(2);

        let mut messages = vec![Message::user("loop forever")];
        let outcome = agent.run(&mut messages).await.unwrap();

        assert!(outcome.capped);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls_made, 2);
        assert_eq!(provider.calls(), 3);
        assert_eq!(outcome.answer, ADD_CALL);
    }

    #[tokio::test]
    async fn reasoning_tool_calls_are_not_executed() {
        let reply = format!("<think>maybe {ADD_CALL}</think>\n\nNo tool needed: 4.");
        let provider = ScriptedProvider::new(&[reply.as_str()]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut messages = vec![Message::user("2+2")];
        let outcome = agent.run_with_events(&mut messages, &tx).await.unwrap();

        assert_eq!(outcome.answer, "No tool needed: 4.");
        assert_eq!(outcome.tool_calls_made, 0);
        let events = drain(rx);
        assert!(matches!(&events[0], StreamEvent::Thinking { content } if content.starts_with("maybe")));
        assert_eq!(events[1], StreamEvent::token("No tool needed: 4."));
    }

    #[tokio::test]
    async fn native_tool_calls_take_precedence() {
        let mut args = Map::new();
        args.insert("a".into(), json!(1));
        args.insert("b".into(), json!(5));
        let native = ProviderResponse {
            tool_calls: vec![ToolCallRequest::new("calculator", args)],
            tokens_used: Some(10),
            ..ProviderResponse::default()
        };
        let answer = ProviderResponse { tokens_used: Some(5), ..ProviderResponse::text("6") };
        let provider = ScriptedProvider::with_responses(vec![native, answer]);
        let agent = AgentLoop::new(provider, "mock-model", registry());

        let mut messages = vec![Message::user("1+5")];
        let outcome = agent.run(&mut messages).await.unwrap();
        assert_eq!(outcome.answer, "6");
        assert_eq!(outcome.tokens_used, Some(15));
        assert!(messages.iter().any(|m| m.role == Role::Tool && m.content == "6"));
    }

    #[tokio::test]
    async fn provider_error_is_terminal() {
        let agent = AgentLoop::new(Arc::new(FailingProvider), "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut messages = vec![Message::user("hi")];
        let err = agent.run_with_events(&mut messages, &tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ProviderError::Network(_))));
        assert_eq!(
            drain(rx),
            vec![StreamEvent::Error { message: "Network error: connection refused".into() }]
        );
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_before_probe() {
        let provider = ScriptedProvider::new(&["never sent"]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);

        let mut messages = vec![Message::user("hi")];
        let err = agent.run_with_events(&mut messages, &tx).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn tools_disabled_skips_injection() {
        let provider = ScriptedProvider::new(&["plain"]);
        let agent = AgentLoop::new(provider, "mock-model", registry())
            .with_tools_enabled(false)
            .with_system_prompt("Base prompt.");

        let mut messages = vec![Message::user("hi")];
        agent.run(&mut messages).await.unwrap();
        assert_eq!(messages[0].content, "Base prompt.");
    }

    #[tokio::test]
    async fn repeated_runs_inject_once() {
        let provider = ScriptedProvider::new(&["one", "two"]);
        let agent = AgentLoop::new(provider, "mock-model", registry());

        let mut messages = vec![Message::user("first")];
        agent.run(&mut messages).await.unwrap();
        messages.push(Message::user("second"));
        agent.run(&mut messages).await.unwrap();

        assert_eq!(messages[0].content.matches(TOOL_PROMPT_HEADER).count(), 1);
        assert_eq!(messages.len(), 5);
    }

    #[tokio::test]
    async fn config_sets_loop_parameters() {
        let config = AgentConfig {
            model: "llama3".into(),
            max_iterations: 1,
            ..AgentConfig::default()
        };
        let provider = ScriptedProvider::new(&[ADD_CALL]);
        let agent = AgentLoop::new(provider.clone(), "ignored", registry()).with_config(&config);

        let mut messages = vec![Message::user("go")];
        let outcome = agent.run(&mut messages).await.unwrap();
        assert!(outcome.capped);
        assert_eq!(provider.calls(), 2);
        assert_eq!(provider.requests.lock().unwrap()[0].model, "llama3");
    }

    #[tokio::test]
    async fn streaming_run_forwards_live_and_ends_with_one_done() {
        let first = format!("<think>need math</think>{ADD_CALL}");
        let second = "Two plus two is 4.";
        let provider = ScriptedProvider::with_responses(vec![
            ProviderResponse { tokens_used: Some(3), ..ProviderResponse::text(first) },
            ProviderResponse { tokens_used: Some(4), ..ProviderResponse::text(second) },
        ]);
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut messages = vec![Message::user("2+2?")];
        let outcome = agent.run_streaming(&mut messages, &tx).await.unwrap();
        assert_eq!(outcome.answer, second);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.tokens_used, Some(7));

        let events = drain(rx);
        assert_eq!(events[0], StreamEvent::thinking("need math"));
        assert_eq!(
            events[1],
            StreamEvent::ToolCall { name: "calculator".into(), args: json!({"a": 2, "b": 2}) }
        );
        assert_eq!(events[2], StreamEvent::ToolResult { name: "calculator".into(), result: "4".into() });

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, second);

        let dones = events.iter().filter(|e| matches!(e, StreamEvent::Done { .. })).count();
        assert_eq!(dones, 1);
        assert_eq!(events.last(), Some(&StreamEvent::Done { tokens_used: Some(7) }));
    }

    #[tokio::test]
    async fn streaming_detects_unfenced_json_calls() {
        let bare = r#"{"name": "calculator", "arguments": {"a": 1, "b": 5}}"#;
        let provider = ScriptedProvider::new(&[bare, "It is 6."]);
        let agent = AgentLoop::new(provider.clone(), "mock-model", registry());
        let (tx, rx) = mpsc::unbounded_channel();

        let mut messages = vec![Message::user("1+5?")];
        let outcome = agent.run_streaming(&mut messages, &tx).await.unwrap();
        assert_eq!(outcome.answer, "It is 6.");
        assert_eq!(outcome.tool_calls_made, 1);
        assert_eq!(provider.calls(), 2);

        let tool = messages.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool.content, "6");
        assert!(drain(rx).contains(&StreamEvent::ToolResult { name: "calculator".into(), result: "6".into() }));

        // Same reply, same call, without streaming.
        let provider = ScriptedProvider::new(&[bare, "It is 6."]);
        let agent = AgentLoop::new(provider, "mock-model", registry());
        let mut messages = vec![Message::user("1+5?")];
        assert_eq!(agent.run(&mut messages).await.unwrap().tool_calls_made, 1);
    }
}

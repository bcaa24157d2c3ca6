//! Incremental splitting of a streamed reply into visible tokens,
//! reasoning, and tool calls.
//!
//! Markers may arrive split across fragments. Any trailing text that could
//! still become an opening marker is held back until the next fragment
//! disambiguates it, so a partial tag never reaches the client.

use ember_config::SegmenterConfig;

use crate::protocol::{self, FENCE_CLOSE, THINK_CLOSE, THINK_OPEN, TOOL_FENCE_OPEN};
use crate::stream_event::StreamEvent;

/// Delimiters recognized by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub think_open: String,
    pub think_close: String,
    pub tool_open: String,
    pub tool_close: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            think_open: THINK_OPEN.into(),
            think_close: THINK_CLOSE.into(),
            tool_open: TOOL_FENCE_OPEN.into(),
            tool_close: FENCE_CLOSE.into(),
        }
    }
}

impl From<&SegmenterConfig> for Markers {
    /// Empty markers in the config fall back to the defaults.
    fn from(config: &SegmenterConfig) -> Self {
        let defaults = Self::default();
        let pick = |value: &str, fallback: String| if value.is_empty() { fallback } else { value.to_string() };
        Self {
            think_open: pick(&config.think_open, defaults.think_open),
            think_close: pick(&config.think_close, defaults.think_close),
            tool_open: defaults.tool_open,
            tool_close: defaults.tool_close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Emitting,
    Reasoning,
    ToolCall,
}

pub struct StreamSegmenter {
    markers: Markers,
    state: State,
    buffer: String,
    /// Set after a reasoning region closes; cleared by the first
    /// non-newline character.
    strip_newlines: bool,
}

impl StreamSegmenter {
    pub fn new(markers: Markers) -> Self {
        Self {
            markers,
            state: State::Emitting,
            buffer: String::new(),
            strip_newlines: false,
        }
    }

    /// Feed one fragment and return the events it completes.
    pub fn push(&mut self, fragment: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(fragment);
        let mut events = Vec::new();

        loop {
            let progressed = match self.state {
                State::Emitting => self.step_emitting(&mut events),
                State::Reasoning => self.step_reasoning(&mut events),
                State::ToolCall => self.step_tool_call(&mut events),
            };
            if !progressed {
                break;
            }
        }

        events
    }

    /// Flush whatever is buffered and close the sequence with `done`.
    pub fn finish(&mut self, tokens_used: Option<u32>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);

        match self.state {
            State::Reasoning => {
                let thought = rest.trim();
                if !thought.is_empty() {
                    events.push(StreamEvent::thinking(thought));
                }
            }
            State::ToolCall => match tool_call_event(&rest) {
                Some(event) => events.push(event),
                None => tracing::debug!("Dropping unterminated tool call block"),
            },
            State::Emitting => {
                let rest = if self.strip_newlines {
                    rest.trim_start_matches(['\n', '\r'])
                } else {
                    rest.as_str()
                };
                if !rest.is_empty() {
                    events.push(StreamEvent::token(rest));
                }
            }
        }

        self.state = State::Emitting;
        self.strip_newlines = false;
        events.push(StreamEvent::Done { tokens_used });
        events
    }

    fn step_emitting(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        if self.strip_newlines {
            let kept = self.buffer.trim_start_matches(['\n', '\r']).len();
            self.buffer.drain(..self.buffer.len() - kept);
            if self.buffer.is_empty() {
                return false;
            }
            self.strip_newlines = false;
        }

        let think = find_marker(&self.buffer, &self.markers.think_open);
        let tool = find_marker(&self.buffer, &self.markers.tool_open);
        let next = match (think, tool) {
            (Some(t), Some(c)) if c < t => Some((c, State::ToolCall, self.markers.tool_open.len())),
            (Some(t), _) => Some((t, State::Reasoning, self.markers.think_open.len())),
            (None, Some(c)) => Some((c, State::ToolCall, self.markers.tool_open.len())),
            (None, None) => None,
        };

        match next {
            Some((pos, state, marker_len)) => {
                if pos > 0 {
                    events.push(StreamEvent::token(&self.buffer[..pos]));
                }
                self.buffer.drain(..pos + marker_len);
                self.state = state;
                true
            }
            None => {
                let held = [&self.markers.think_open, &self.markers.tool_open]
                    .into_iter()
                    .map(|marker| partial_suffix(&self.buffer, marker))
                    .max()
                    .unwrap_or(0);
                let cut = self.buffer.len() - held;
                if cut > 0 {
                    events.push(StreamEvent::token(&self.buffer[..cut]));
                    self.buffer.drain(..cut);
                }
                false
            }
        }
    }

    fn step_reasoning(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        let Some(pos) = find_marker(&self.buffer, &self.markers.think_close) else {
            return false;
        };
        let thought = self.buffer[..pos].trim();
        if !thought.is_empty() {
            events.push(StreamEvent::thinking(thought));
        }
        self.buffer.drain(..pos + self.markers.think_close.len());
        self.state = State::Emitting;
        self.strip_newlines = true;
        true
    }

    fn step_tool_call(&mut self, events: &mut Vec<StreamEvent>) -> bool {
        let Some(pos) = find_marker(&self.buffer, &self.markers.tool_close) else {
            return false;
        };
        match tool_call_event(&self.buffer[..pos]) {
            Some(event) => events.push(event),
            None => tracing::warn!("Skipping malformed tool call block in stream"),
        }
        self.buffer.drain(..pos + self.markers.tool_close.len());
        self.state = State::Emitting;
        true
    }
}

impl Default for StreamSegmenter {
    fn default() -> Self {
        Self::new(Markers::default())
    }
}

fn find_marker(haystack: &str, marker: &str) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    haystack.find(marker)
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn partial_suffix(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .filter(|&k| marker.is_char_boundary(k))
        .find(|&k| text.ends_with(&marker[..k]))
        .unwrap_or(0)
}

fn tool_call_event(body: &str) -> Option<StreamEvent> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let request = protocol::request_from_value(&value)?;
    Some(StreamEvent::ToolCall {
        args: request.arguments.to_value(),
        name: request.name,
    })
}

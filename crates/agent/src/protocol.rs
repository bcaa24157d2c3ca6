//! Prompt-based tool calling, for backends without native function calling.
//!
//! Tool descriptions and a fixed instruction block are appended to the
//! system prompt; the model answers with a fenced JSON block:
//!
//! ````text
//! ```tool_call
//! {"name": "calculator", "arguments": {"expression": "2+2"}}
//! ```
//! ````

use ember_core::{Arguments, ToolCallRequest, ToolRegistry};
use serde_json::Value;

pub const TOOL_FENCE_OPEN: &str = "```tool_call";
pub const FENCE_CLOSE: &str = "```";
pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// First line of the injected instruction block.
pub const TOOL_PROMPT_HEADER: &str = "You have access to the following tools.";

/// Result of scanning a model reply for tool calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// `None` when the reply contains no tool call at all.
    pub requests: Option<Vec<ToolCallRequest>>,
    pub visible_text: String,
}

/// Render every registered tool as prose for the system prompt.
pub fn build_tool_descriptions(registry: &ToolRegistry) -> String {
    let descriptions: Vec<String> = registry
        .tools()
        .iter()
        .map(|tool| {
            let schema = tool.parameters_schema();
            let required: Vec<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .map(|r| r.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();

            let params: Vec<String> = schema
                .get("properties")
                .and_then(Value::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(pname, pinfo)| {
                            let ptype = pinfo.get("type").and_then(Value::as_str).unwrap_or("string");
                            let pdesc = pinfo.get("description").and_then(Value::as_str).unwrap_or("");
                            let marker = if required.contains(&pname.as_str()) { "required" } else { "optional" };
                            format!("    - {pname} ({ptype} ({marker})): {pdesc}")
                        })
                        .collect()
                })
                .unwrap_or_default();

            let params = if params.is_empty() {
                "    (no parameters)".to_string()
            } else {
                params.join("\n")
            };
            format!("  **{}**: {}\n  Parameters:\n{params}", tool.name(), tool.description())
        })
        .collect();

    descriptions.join("\n\n")
}

/// Append the tool-calling instruction block to `system_prompt`.
pub fn inject(system_prompt: &str, registry: &ToolRegistry) -> String {
    format!(
        "{system_prompt}\n\n{TOOL_PROMPT_HEADER} To use a tool, respond with a JSON block in this exact format:\n\n\
         {TOOL_FENCE_OPEN}\n{{\"name\": \"tool_name\", \"arguments\": {{\"arg1\": \"value1\"}}}}\n{FENCE_CLOSE}\n\n\
         Available tools:\n{}\n\n\
         IMPORTANT RULES:\n\
         - When you need to use a tool, output ONLY the tool_call JSON block, nothing else.\n\
         - After the tool result is provided, give your final answer to the user.\n\
         - If you don't need any tool, just respond normally without any tool_call block.\n\
         - You may call only ONE tool at a time.",
        build_tool_descriptions(registry)
    )
}

/// Encode a request in the fenced form the model is asked to produce.
pub fn format_tool_call(request: &ToolCallRequest) -> String {
    let body = serde_json::json!({
        "name": request.name,
        "arguments": request.arguments.to_value(),
    });
    format!("{TOOL_FENCE_OPEN}\n{body}\n{FENCE_CLOSE}")
}

/// Scan a reply for tool calls.
///
/// Fenced blocks are tried first; a malformed block is skipped. Only when
/// no fence yields a request is the text searched for a bare JSON object
/// with a string `name` and an object or string `arguments`.
pub fn parse(text: &str) -> ParsedResponse {
    let (mut requests, fence_spans) = parse_fenced(text);
    let mut spans = fence_spans;

    if requests.is_empty() {
        let (bare, bare_spans) = parse_bare(text);
        requests = bare;
        spans.extend(bare_spans);
        spans.sort_unstable();
    }

    if requests.is_empty() {
        return ParsedResponse {
            requests: None,
            visible_text: text.to_string(),
        };
    }

    ParsedResponse {
        requests: Some(requests),
        visible_text: remove_spans(text, &spans).trim().to_string(),
    }
}

fn parse_fenced(text: &str) -> (Vec<ToolCallRequest>, Vec<(usize, usize)>) {
    let mut requests = Vec::new();
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(TOOL_FENCE_OPEN) {
        let start = cursor + rel;
        let body_start = start + TOOL_FENCE_OPEN.len();
        let Some(close_rel) = text[body_start..].find(FENCE_CLOSE) else {
            break;
        };
        let body_end = body_start + close_rel;
        let end = body_end + FENCE_CLOSE.len();
        spans.push((start, end));
        cursor = end;

        let body = text[body_start..body_end].trim();
        match serde_json::from_str::<Value>(body) {
            Ok(value) => match request_from_value(&value) {
                Some(request) => requests.push(request),
                None => tracing::warn!("Tool call block has no 'name': {}", preview(body)),
            },
            Err(e) => tracing::warn!("Failed to parse tool call JSON ({e}): {}", preview(body)),
        }
    }

    (requests, spans)
}

fn parse_bare(text: &str) -> (Vec<ToolCallRequest>, Vec<(usize, usize)>) {
    let mut requests = Vec::new();
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find('{') {
        let start = cursor + rel;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                if let Some(request) = request_from_value(&value).filter(|_| value.get("arguments").is_some()) {
                    let end = start + stream.byte_offset();
                    requests.push(request);
                    spans.push((start, end));
                    cursor = end;
                    continue;
                }
            }
            Some(Err(_)) | None => {}
        }
        cursor = start + 1;
    }

    (requests, spans)
}

/// Build a request from `{"name": "...", "arguments": {...} | "..."}`.
///
/// Missing arguments become an empty map. Arguments of any other JSON kind
/// reject the call.
pub fn request_from_value(value: &Value) -> Option<ToolCallRequest> {
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => Arguments::default(),
        Some(Value::Object(map)) => Arguments::Json(map.clone()),
        Some(Value::String(raw)) => Arguments::Raw(raw.clone()),
        Some(_) => return None,
    };
    let mut request = ToolCallRequest::new(name, arguments);
    if let Some(id) = value.get("id").and_then(Value::as_str).filter(|id| !id.is_empty()) {
        request.id = id.to_string();
    }
    Some(request)
}

fn remove_spans(text: &str, spans: &[(usize, usize)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for &(start, end) in spans {
        if start < last {
            continue;
        }
        out.push_str(&text[last..start]);
        last = end;
    }
    out.push_str(&text[last..]);
    out
}

fn preview(body: &str) -> &str {
    match body.char_indices().nth(100) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}

/// Split `text` into its reasoning content and the remaining text.
///
/// Only complete `open…close` regions are removed. Newlines directly after
/// a close marker are dropped. Reasoning is `None` when every region was
/// empty after trimming.
pub fn split_reasoning(text: &str, open: &str, close: &str) -> (Option<String>, String) {
    let mut reasoning = Vec::new();
    let mut rest = String::with_capacity(text.len());
    let mut cursor = 0;

    while let Some(rel) = text[cursor..].find(open) {
        let start = cursor + rel;
        let body_start = start + open.len();
        let Some(close_rel) = text[body_start..].find(close) else {
            break;
        };
        rest.push_str(&text[cursor..start]);
        let thought = text[body_start..body_start + close_rel].trim();
        if !thought.is_empty() {
            reasoning.push(thought);
        }
        cursor = body_start + close_rel + close.len();
        cursor += text[cursor..].len() - text[cursor..].trim_start_matches(['\n', '\r']).len();
    }
    rest.push_str(&text[cursor..]);

    let reasoning = (!reasoning.is_empty()).then(|| reasoning.join("\n\n"));
    (reasoning, rest)
}

/// Remove complete `<think>…</think>` regions so tool calls written while
/// reasoning are never executed.
pub fn strip_reasoning(text: &str) -> String {
    split_reasoning(text, THINK_OPEN, THINK_CLOSE).1
}

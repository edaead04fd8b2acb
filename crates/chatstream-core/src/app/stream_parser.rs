//! Streaming text parser with inline tool-call detection.
//!
//! Some models emit tool calls as markup inside plain text:
//!
//! ```text
//! Let me look.<tool_call>{"name": "read_file", "arguments": {"path": "a.rs"}}</tool_call>
//! ```
//!
//! The markup can be split across any number of deltas, so text that might be
//! the start of a tag is held back until the next delta settles it.

use crate::app::collaborators::StreamTextParser;
use crate::app::conversation::{Message, MessagePart, ToolCall};
use crate::app::domain::event::FunctionCall;
use crate::app::domain::types::{MessageId, ToolCallId};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

#[derive(Debug, Deserialize)]
struct InlineCallBody {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default, alias = "args", alias = "parameters")]
    arguments: Value,
}

/// Id for the `ordinal`-th inline tool call of a message without its own id.
pub fn inline_tool_call_id(message_id: &MessageId, ordinal: usize) -> ToolCallId {
    ToolCallId(format!("{message_id}-inline-{ordinal}"))
}

/// Id for the `ordinal`-th native function call of a message without its own id.
pub fn function_call_id(message_id: &MessageId, ordinal: usize) -> ToolCallId {
    ToolCallId(format!("{message_id}-call-{ordinal}"))
}

/// Parse the JSON between the markup tags into a tool call.
pub fn parse_inline_call(body: &str, message_id: &MessageId, ordinal: usize) -> Option<ToolCall> {
    let parsed: InlineCallBody = serde_json::from_str(body.trim()).ok()?;
    if parsed.name.trim().is_empty() {
        return None;
    }
    let id = parsed
        .id
        .filter(|id| !id.is_empty())
        .map_or_else(|| inline_tool_call_id(message_id, ordinal), ToolCallId);
    Some(ToolCall::new(id, parsed.name, parsed.arguments))
}

#[derive(Debug, Clone, PartialEq)]
pub enum InlineSegment {
    Text(String),
    Call(ToolCall),
}

/// Split finished text into plain text and inline tool calls, in order.
///
/// Markup whose body does not parse stays in the text verbatim. `ordinal`
/// is advanced once per recognised call.
pub fn split_inline_tool_calls(
    text: &str,
    message_id: &MessageId,
    ordinal: &mut usize,
) -> Vec<InlineSegment> {
    let mut segments = Vec::new();
    let mut plain = String::new();
    let mut rest = text;

    while let Some(open) = rest.find(TOOL_CALL_OPEN) {
        plain.push_str(&rest[..open]);
        let after_open = &rest[open + TOOL_CALL_OPEN.len()..];
        let (body, remainder, closed) = match after_open.find(TOOL_CALL_CLOSE) {
            Some(close) => (
                &after_open[..close],
                &after_open[close + TOOL_CALL_CLOSE.len()..],
                true,
            ),
            None => (after_open, "", false),
        };

        if let Some(call) = parse_inline_call(body, message_id, *ordinal) {
            *ordinal += 1;
            if !plain.is_empty() {
                segments.push(InlineSegment::Text(std::mem::take(&mut plain)));
            }
            segments.push(InlineSegment::Call(call));
        } else {
            plain.push_str(TOOL_CALL_OPEN);
            plain.push_str(body);
            if closed {
                plain.push_str(TOOL_CALL_CLOSE);
            }
        }
        rest = remainder;
    }
    plain.push_str(rest);
    if !plain.is_empty() {
        segments.push(InlineSegment::Text(plain));
    }
    segments
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&k| text.ends_with(&tag[..k]))
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct BufferState {
    /// Held-back text: a possible tag prefix, or the body of an open call.
    pending: String,
    in_call: bool,
    inline_count: usize,
    native_count: usize,
}

/// Default [`StreamTextParser`] that recognises `<tool_call>` markup.
#[derive(Debug, Default)]
pub struct InlineToolCallParser {
    buffers: HashMap<MessageId, BufferState>,
}

impl InlineToolCallParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self, message_id: &MessageId) -> bool {
        self.buffers
            .get(message_id)
            .is_some_and(|b| b.in_call || !b.pending.is_empty())
    }

    fn push_tool(message: &mut Message, call: ToolCall) {
        if message.has_tool(&call.id) {
            return;
        }
        message.parts.push(MessagePart::FunctionCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        });
        message.tools.push(call);
    }

    fn append_text(message: &mut Message, text: &str, is_thought: bool) {
        if text.is_empty() {
            return;
        }
        match message.parts.last_mut() {
            Some(MessagePart::Text { text: last, thought }) if *thought == is_thought => {
                last.push_str(text);
            }
            _ => message.parts.push(MessagePart::Text {
                text: text.to_string(),
                thought: is_thought,
            }),
        }
        if !is_thought {
            message.content.push_str(text);
        }
    }

    fn close_call(message: &mut Message, state: &mut BufferState, body: &str, closed: bool) {
        if let Some(call) = parse_inline_call(body, &message.id, state.inline_count) {
            state.inline_count += 1;
            tracing::debug!(
                target: "chatstream::parser",
                message_id = %message.id,
                tool_id = %call.id,
                tool = %call.name,
                "Detected inline tool call"
            );
            Self::push_tool(message, call);
        } else {
            let mut verbatim = String::with_capacity(body.len() + 24);
            verbatim.push_str(TOOL_CALL_OPEN);
            verbatim.push_str(body);
            if closed {
                verbatim.push_str(TOOL_CALL_CLOSE);
            }
            Self::append_text(message, &verbatim, false);
        }
    }
}

impl StreamTextParser for InlineToolCallParser {
    fn add_text_to_message(&mut self, message: &mut Message, text: &str, is_thought: bool) {
        Self::append_text(message, text, is_thought);
    }

    fn process_streaming_text(&mut self, message: &mut Message, text: &str) {
        let state = self.buffers.entry(message.id.clone()).or_default();
        let mut buf = std::mem::take(&mut state.pending);
        buf.push_str(text);

        loop {
            if state.in_call {
                let Some(close) = buf.find(TOOL_CALL_CLOSE) else {
                    state.pending = buf;
                    return;
                };
                let body = buf[..close].to_string();
                buf = buf[close + TOOL_CALL_CLOSE.len()..].to_string();
                state.in_call = false;
                Self::close_call(message, state, &body, true);
            } else if let Some(open) = buf.find(TOOL_CALL_OPEN) {
                Self::append_text(message, &buf[..open], false);
                buf = buf[open + TOOL_CALL_OPEN.len()..].to_string();
                state.in_call = true;
            } else {
                let held = partial_tag_suffix(&buf, TOOL_CALL_OPEN);
                let split = buf.len() - held;
                Self::append_text(message, &buf[..split], false);
                state.pending = buf[split..].to_string();
                return;
            }
        }
    }

    fn flush_tool_call_buffer(&mut self, message: &mut Message) {
        let Some(mut state) = self.buffers.remove(&message.id) else {
            return;
        };
        let pending = std::mem::take(&mut state.pending);
        if state.in_call {
            Self::close_call(message, &mut state, &pending, false);
        } else {
            Self::append_text(message, &pending, false);
        }
    }

    fn handle_function_call_part(&mut self, call: &FunctionCall, message: &mut Message) {
        let state = self.buffers.entry(message.id.clone()).or_default();
        let id = call.id.clone().unwrap_or_else(|| {
            let id = function_call_id(&message.id, state.native_count);
            state.native_count += 1;
            id
        });
        Self::push_tool(message, ToolCall::new(id, call.name.clone(), call.args.clone()));
    }

    fn discard(&mut self, message_id: &MessageId) {
        self.buffers.remove(message_id);
    }
}

use crate::app::collaborators::MessageBuilder;
use crate::app::conversation::{Message, MessageMetadata, MessagePart, Role, ToolCall};
use crate::app::domain::event::{Content, ContentPart};
use crate::app::domain::types::{MessageId, now_millis};
use crate::app::stream_parser::{InlineSegment, function_call_id, split_inline_tool_calls};

/// Builds assistant messages from finalized backend content.
///
/// Tool calls come out in `Streaming` status; assigning real statuses is the
/// dispatcher's job. Inline `<tool_call>` markup in visible text is lifted
/// into tool calls with the same ids the streaming parser assigns.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMessageBuilder;

impl DefaultMessageBuilder {
    fn push_text(parts: &mut Vec<MessagePart>, text: String, thought: bool) {
        if text.is_empty() {
            return;
        }
        match parts.last_mut() {
            Some(MessagePart::Text {
                text: last,
                thought: last_thought,
            }) if *last_thought == thought => last.push_str(&text),
            _ => parts.push(MessagePart::Text { text, thought }),
        }
    }

    fn push_call(parts: &mut Vec<MessagePart>, tools: &mut Vec<ToolCall>, call: ToolCall) {
        if tools.iter().any(|t| t.id == call.id) {
            return;
        }
        parts.push(MessagePart::FunctionCall {
            id: call.id.clone(),
            name: call.name.clone(),
            args: call.arguments.clone(),
        });
        tools.push(call);
    }
}

impl MessageBuilder for DefaultMessageBuilder {
    fn content_to_message(&self, content: &Content, message_id: &MessageId) -> Message {
        let mut parts = Vec::new();
        let mut tools = Vec::new();
        let mut inline_ordinal = 0;
        let mut native_ordinal = 0;

        let has_text_parts = content.parts.iter().any(|p| p.text.is_some());
        let shorthand = content
            .text
            .as_ref()
            .filter(|_| !has_text_parts)
            .map(|text| ContentPart::text(text.clone()));

        for part in shorthand.iter().chain(content.parts.iter()) {
            if let Some(text) = &part.text {
                if part.thought {
                    Self::push_text(&mut parts, text.clone(), true);
                } else {
                    for segment in split_inline_tool_calls(text, message_id, &mut inline_ordinal) {
                        match segment {
                            InlineSegment::Text(text) => Self::push_text(&mut parts, text, false),
                            InlineSegment::Call(call) => {
                                Self::push_call(&mut parts, &mut tools, call);
                            }
                        }
                    }
                }
            }
            if let Some(call) = &part.function_call {
                let id = call.id.clone().unwrap_or_else(|| {
                    let id = function_call_id(message_id, native_ordinal);
                    native_ordinal += 1;
                    id
                });
                Self::push_call(
                    &mut parts,
                    &mut tools,
                    ToolCall::new(id, call.name.clone(), call.args.clone()),
                );
            }
        }

        let mut metadata = MessageMetadata {
            model_version: content.model_version.clone(),
            ..MessageMetadata::default()
        };
        if let Some(usage) = &content.usage {
            metadata.merge_usage(usage);
        }
        if let Some(timing) = &content.timing {
            metadata.merge_timing(timing);
        }

        let mut message = Message {
            id: message_id.clone(),
            role: Role::Assistant,
            is_function_response: false,
            content: String::new(),
            parts,
            tools,
            metadata,
            streaming: false,
            local_only: true,
            timestamp: now_millis(),
        };
        message.content = message.visible_text();
        message
    }
}

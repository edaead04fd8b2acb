//! Message types for the in-memory conversation window.
//!
//! - `Message` - one unit of conversation, replaced wholesale on every update
//! - `MessagePart` - ordered text / function-call / function-response fragments
//! - `ToolCall` and `ToolStatus` - the tool invocation lifecycle
//! - `MessageMetadata` - model version, token usage and timing

use crate::app::domain::types::{MessageId, Timestamp, ToolCallId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::Display;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a single tool invocation.
///
/// `Success` and `Error` are terminal: once reached, only newer terminal
/// evidence may replace them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Streaming,
    Queued,
    Executing,
    AwaitingApproval,
    AwaitingApply,
    Success,
    Error,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ToolStatus::Success | ToolStatus::Error)
    }
}

/// Result payload for a resolved tool call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub id: ToolCallId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub response: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub rejected: bool,
}

impl ToolResult {
    pub fn is_failure(&self) -> bool {
        self.cancelled || self.rejected
    }

    pub fn terminal_status(&self) -> ToolStatus {
        if self.is_failure() {
            ToolStatus::Error
        } else {
            ToolStatus::Success
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: ToolCallId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
}

impl ToolCall {
    pub fn new(id: impl Into<ToolCallId>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            status: ToolStatus::Streaming,
            result: None,
        }
    }

    /// Fill fields this entry never populated from another snapshot of the
    /// same call. Populated fields, including `status`, are left alone.
    pub fn fill_missing_from(&mut self, other: &ToolCall) {
        if self.name.is_empty() {
            self.name.clone_from(&other.name);
        }
        if self.arguments.is_null() {
            self.arguments = other.arguments.clone();
        }
        if self.result.is_none() {
            self.result.clone_from(&other.result);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "is_false")]
        thought: bool,
    },
    FunctionCall {
        id: ToolCallId,
        name: String,
        #[serde(default)]
        args: Value,
    },
    FunctionResponse {
        id: ToolCallId,
        name: String,
        #[serde(default)]
        response: Value,
    },
}

impl MessagePart {
    fn carries_payload(&self) -> bool {
        match self {
            MessagePart::Text { text, .. } => !text.trim().is_empty(),
            MessagePart::FunctionCall { .. } => true,
            MessagePart::FunctionResponse { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content_token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_count: Option<u64>,
}

/// Timing figures reported by the backend for one turn.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_start_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_chunk_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Fixed when the message is created; later server data never overwrites it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
    #[serde(default)]
    pub timing: Timing,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl MessageMetadata {
    /// Overlay every timing field `timing` carries.
    pub fn merge_timing(&mut self, timing: &Timing) {
        let t = &mut self.timing;
        t.thinking_start_time = timing.thinking_start_time.or(t.thinking_start_time);
        t.thinking_duration = timing.thinking_duration.or(t.thinking_duration);
        t.response_duration = timing.response_duration.or(t.response_duration);
        t.stream_duration = timing.stream_duration.or(t.stream_duration);
        t.first_chunk_time = timing.first_chunk_time.or(t.first_chunk_time);
        t.chunk_count = timing.chunk_count.or(t.chunk_count);
    }

    /// Copy token counts from a usage report, keeping counts it omits.
    pub fn merge_usage(&mut self, usage: &UsageMetadata) {
        let current = self.usage.get_or_insert_with(UsageMetadata::default);
        current.prompt_token_count = usage.prompt_token_count.or(current.prompt_token_count);
        current.candidates_token_count = usage
            .candidates_token_count
            .or(current.candidates_token_count);
        current.thoughts_token_count = usage.thoughts_token_count.or(current.thoughts_token_count);
        current.cached_content_token_count = usage
            .cached_content_token_count
            .or(current.cached_content_token_count);
        current.total_token_count = usage.total_token_count.or(current.total_token_count);
    }

    /// Take anything `previous` knew that this snapshot does not.
    pub fn fill_missing_from(&mut self, previous: &MessageMetadata) {
        if self.model_version.is_none() {
            self.model_version.clone_from(&previous.model_version);
        }
        if let Some(usage) = &previous.usage {
            let fresh = self.usage.take();
            self.usage = Some(usage.clone());
            if let Some(fresh) = fresh {
                self.merge_usage(&fresh);
            }
        }
        let fresh_timing = self.timing;
        self.timing = previous.timing;
        self.merge_timing(&fresh_timing);
        for (key, value) in &previous.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    /// Hidden carrier for tool results; never shown as a chat bubble.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_function_response: bool,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCall>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub local_only: bool,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn user(id: MessageId, text: impl Into<String>, timestamp: Timestamp) -> Self {
        let text = text.into();
        Self {
            id,
            role: Role::User,
            is_function_response: false,
            parts: vec![MessagePart::Text {
                text: text.clone(),
                thought: false,
            }],
            content: text,
            tools: Vec::new(),
            metadata: MessageMetadata::default(),
            streaming: false,
            local_only: true,
            timestamp,
        }
    }

    /// Empty assistant message that will receive the next turn's output.
    pub fn assistant_placeholder(id: MessageId, model: String, timestamp: Timestamp) -> Self {
        Self {
            id,
            role: Role::Assistant,
            is_function_response: false,
            content: String::new(),
            parts: Vec::new(),
            tools: Vec::new(),
            metadata: MessageMetadata {
                model_version: Some(model),
                ..MessageMetadata::default()
            },
            streaming: true,
            local_only: true,
            timestamp,
        }
    }

    /// Hidden user-role message carrying one `FunctionResponse` part per result.
    pub fn function_response(id: MessageId, results: &[ToolResult], timestamp: Timestamp) -> Self {
        Self {
            id,
            role: Role::User,
            is_function_response: true,
            content: String::new(),
            parts: results
                .iter()
                .map(|result| MessagePart::FunctionResponse {
                    id: result.id.clone(),
                    name: result.name.clone(),
                    response: result.response.clone(),
                })
                .collect(),
            tools: Vec::new(),
            metadata: MessageMetadata::default(),
            streaming: false,
            local_only: false,
            timestamp,
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    /// True when nothing was ever produced for this message.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
            && !self.parts.iter().any(MessagePart::carries_payload)
            && self.tools.is_empty()
    }

    /// Concatenation of all non-thought text parts.
    pub fn visible_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text {
                    text,
                    thought: false,
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool(&self, id: &ToolCallId) -> bool {
        self.tools.iter().any(|tool| &tool.id == id)
    }

    pub fn tool(&self, id: &ToolCallId) -> Option<&ToolCall> {
        self.tools.iter().find(|tool| &tool.id == id)
    }

    pub fn tool_mut(&mut self, id: &ToolCallId) -> Option<&mut ToolCall> {
        self.tools.iter_mut().find(|tool| &tool.id == id)
    }

    /// Tool-result ids this message carries as hidden function responses.
    pub fn function_response_ids(&self) -> impl Iterator<Item = &ToolCallId> + '_ {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::FunctionResponse { id, .. } if self.is_function_response => Some(id),
            _ => None,
        })
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

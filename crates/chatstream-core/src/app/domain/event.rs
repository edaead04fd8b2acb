//! Stream events delivered by the backend for a model turn.
//!
//! Every payload field is optional on the wire; a missing field is a no-op
//! for the piece of state it would have touched.

use crate::app::conversation::{CheckpointRecord, Timing, ToolResult, ToolStatus, UsageMetadata};
use crate::app::domain::types::{Timestamp, ToolCallId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_STREAM_ERROR_CODE: &str = "STREAM_ERROR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Incremental content for the message identified by `streaming_message_id`.
    Chunk {
        #[serde(default)]
        chunk: ContentChunk,
    },

    /// Tool calls are about to run without further user input.
    ToolsExecuting {
        #[serde(default)]
        content: Option<Content>,
        #[serde(default, rename = "pendingToolCalls", deserialize_with = "skip_malformed")]
        pending_tool_calls: Vec<PendingToolCall>,
    },

    /// Live status change for a single tool.
    ToolStatus {
        #[serde(default, rename = "toolStatus", deserialize_with = "malformed_as_none")]
        tool_status: Option<ToolStatusUpdate>,
    },

    /// The model requested tool calls that need user approval.
    AwaitingConfirmation {
        #[serde(default)]
        content: Option<Content>,
        #[serde(default, rename = "pendingToolCalls", deserialize_with = "skip_malformed")]
        pending_tool_calls: Vec<PendingToolCall>,
        #[serde(default, rename = "toolResults", deserialize_with = "skip_malformed")]
        tool_results: Vec<ToolResult>,
        #[serde(default, deserialize_with = "skip_malformed")]
        checkpoints: Vec<CheckpointRecord>,
    },

    /// A round of tool execution finished.
    ToolIteration {
        #[serde(default)]
        content: Option<Content>,
        #[serde(default, rename = "toolResults", deserialize_with = "skip_malformed")]
        tool_results: Vec<ToolResult>,
        #[serde(default, deserialize_with = "skip_malformed")]
        checkpoints: Vec<CheckpointRecord>,
    },

    /// The model turn finished with no pending tool calls.
    Complete {
        #[serde(default)]
        content: Option<Content>,
        #[serde(default, deserialize_with = "skip_malformed")]
        checkpoints: Vec<CheckpointRecord>,
    },

    #[serde(alias = "checkpoints-only")]
    Checkpoints {
        #[serde(default, deserialize_with = "skip_malformed")]
        checkpoints: Vec<CheckpointRecord>,
    },

    Cancelled {
        #[serde(default)]
        timing: Option<Timing>,
    },

    Error {
        #[serde(default)]
        error: Option<StreamError>,
    },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::ToolsExecuting { .. } => "tools-executing",
            StreamEvent::ToolStatus { .. } => "tool-status",
            StreamEvent::AwaitingConfirmation { .. } => "awaiting-confirmation",
            StreamEvent::ToolIteration { .. } => "tool-iteration",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Checkpoints { .. } => "checkpoints",
            StreamEvent::Cancelled { .. } => "cancelled",
            StreamEvent::Error { .. } => "error",
        }
    }
}

/// One content fragment, either streamed as a delta or part of a final payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: true,
            function_call: None,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<ToolCallId>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentChunk {
    #[serde(default)]
    pub delta: Vec<ContentPart>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, alias = "usageMetadata")]
    pub usage: Option<UsageMetadata>,
    #[serde(default)]
    pub thinking_start_time: Option<Timestamp>,
    /// Ignored by the reducer: a message's model version is fixed at creation.
    #[serde(default)]
    pub model_version: Option<String>,
}

/// Finalized backend payload for a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
    #[serde(default, alias = "usageMetadata", skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingToolCall {
    pub id: ToolCallId,
}

impl From<&str> for PendingToolCall {
    fn from(id: &str) -> Self {
        Self { id: id.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolStatusUpdate {
    pub id: ToolCallId,
    /// An update without a status is ignored.
    #[serde(default)]
    pub status: Option<ToolStatus>,
    #[serde(default, deserialize_with = "malformed_as_none")]
    pub result: Option<ToolResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamError {
    #[serde(default = "default_error_code")]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

fn default_error_code() -> String {
    DEFAULT_STREAM_ERROR_CODE.to_string()
}

impl StreamError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl Default for StreamError {
    fn default() -> Self {
        Self {
            code: default_error_code(),
            message: "Stream error".to_string(),
        }
    }
}

/// Deserialize a list of records, dropping the ones that do not parse (a tool
/// result without an `id`, say) instead of failing the whole event.
fn skip_malformed<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::debug!(
                    target: "chatstream::event",
                    error = %err,
                    "Skipping malformed record"
                );
                None
            }
        })
        .collect())
}

fn malformed_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

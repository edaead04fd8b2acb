use crate::app::domain::types::{CheckpointId, Timestamp};
use serde::{Deserialize, Serialize};

const USER_MESSAGE_BEFORE: &str = "user_message_before";
const USER_MESSAGE_AFTER: &str = "user_message_after";
const MODEL_MESSAGE_BEFORE: &str = "model_message_before";

/// What a checkpoint was captured around.
///
/// Carried on the wire as the record's `toolName`: the message-boundary
/// sentinels map to their own variants, any other name is a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum CheckpointAnchor {
    UserMessageBefore,
    UserMessageAfter,
    ModelMessageBefore,
    Tool { tool_name: String },
}

impl CheckpointAnchor {
    pub fn as_str(&self) -> &str {
        match self {
            CheckpointAnchor::UserMessageBefore => USER_MESSAGE_BEFORE,
            CheckpointAnchor::UserMessageAfter => USER_MESSAGE_AFTER,
            CheckpointAnchor::ModelMessageBefore => MODEL_MESSAGE_BEFORE,
            CheckpointAnchor::Tool { tool_name } => tool_name,
        }
    }
}

impl From<String> for CheckpointAnchor {
    fn from(name: String) -> Self {
        match name.as_str() {
            USER_MESSAGE_BEFORE => CheckpointAnchor::UserMessageBefore,
            USER_MESSAGE_AFTER => CheckpointAnchor::UserMessageAfter,
            MODEL_MESSAGE_BEFORE => CheckpointAnchor::ModelMessageBefore,
            _ => CheckpointAnchor::Tool { tool_name: name },
        }
    }
}

impl From<CheckpointAnchor> for String {
    fn from(anchor: CheckpointAnchor) -> Self {
        match anchor {
            CheckpointAnchor::Tool { tool_name } => tool_name,
            other => other.as_str().to_string(),
        }
    }
}

/// A restore point in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub id: CheckpointId,
    #[serde(default)]
    pub timestamp: Timestamp,
    #[serde(rename = "toolName")]
    pub anchor: CheckpointAnchor,
    /// Absolute index into the full, unwindowed history.
    #[serde(default)]
    pub message_index: usize,
}

impl CheckpointRecord {
    pub fn is_message_boundary(&self) -> bool {
        !matches!(self.anchor, CheckpointAnchor::Tool { .. })
    }
}

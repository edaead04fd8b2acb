pub mod checkpoint;
pub mod message;

pub use checkpoint::{CheckpointAnchor, CheckpointRecord};
pub use message::{
    Message, MessageMetadata, MessagePart, Role, Timing, ToolCall, ToolResult, ToolStatus,
    UsageMetadata,
};

pub mod effect;
pub mod event;
pub mod history;
pub mod merge;
pub mod reduce;
pub mod runtime;
pub mod state;
pub mod types;
pub mod window;

#[cfg(test)]
mod tests;

pub use effect::Effect;
pub use event::{
    Content, ContentChunk, ContentPart, FunctionCall, PendingToolCall, StreamError, StreamEvent,
    ToolStatusUpdate,
};
pub use history::{HistorySnapshot, delete_message, load_history, restore_to_checkpoint};
pub use reduce::ChunkDispatcher;
pub use runtime::ChatSession;
pub use state::ChatStoreState;
pub use types::{CheckpointId, MessageId, Timestamp, ToolCallId};
pub use window::{MAX_WINDOW_MESSAGES, trim_window_from_top};

pub mod builder;
pub mod collaborators;
pub mod conversation;
pub mod domain;
pub mod stream_parser;

pub use builder::DefaultMessageBuilder;
pub use collaborators::{
    CheckpointSink, Collaborators, ConversationUpdater, IdGenerator, MessageBuilder,
    ModelNameProvider, NoopCheckpointSink, NoopConversationUpdater, RecordingCheckpointSink,
    SequentialIdGenerator, StaticModelName, StreamTextParser, UuidIdGenerator,
};
pub use conversation::{
    CheckpointAnchor, CheckpointRecord, Message, MessageMetadata, MessagePart, Role, Timing,
    ToolCall, ToolResult, ToolStatus, UsageMetadata,
};
pub use domain::{ChatSession, ChatStoreState, ChunkDispatcher, Effect, StreamEvent};
pub use stream_parser::InlineToolCallParser;

//! Seams the dispatcher calls out through.
//!
//! Each collaborator is a trait object injected at construction so hosts and
//! tests can substitute their own implementations.

use crate::app::builder::DefaultMessageBuilder;
use crate::app::conversation::{CheckpointRecord, Message};
use crate::app::domain::event::{Content, FunctionCall};
use crate::app::domain::types::MessageId;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Converts a finalized backend payload into a structured message.
pub trait MessageBuilder: Send + Sync {
    /// The returned message has `streaming` unset.
    fn content_to_message(&self, content: &Content, message_id: &MessageId) -> Message;
}

/// Incremental text sink that also recognises inline tool-call markup.
///
/// Implementations keep any partially received markup per message between
/// calls; `flush_tool_call_buffer` resolves whatever is still pending.
pub trait StreamTextParser: Send {
    fn add_text_to_message(&mut self, message: &mut Message, text: &str, is_thought: bool);

    fn process_streaming_text(&mut self, message: &mut Message, text: &str);

    fn flush_tool_call_buffer(&mut self, message: &mut Message);

    fn handle_function_call_part(&mut self, call: &FunctionCall, message: &mut Message);

    /// Forget buffered state for a message that will receive no more text.
    fn discard(&mut self, _message_id: &MessageId) {}
}

pub trait CheckpointSink: Send + Sync {
    fn add_checkpoint(&self, checkpoint: &CheckpointRecord);
}

pub trait ModelNameProvider: Send + Sync {
    fn current_model_name(&self) -> String;
}

pub trait IdGenerator: Send + Sync {
    fn generate_id(&self) -> MessageId;
}

/// Post-turn hook. Runs detached; its outcome never reaches the reducer.
#[async_trait]
pub trait ConversationUpdater: Send + Sync {
    /// `message_id` is `None` when the turn completed with no message in the window.
    async fn update_conversation_after_message(
        &self,
        message_id: Option<MessageId>,
    ) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate_id(&self) -> MessageId {
        MessageId::new()
    }
}

/// Deterministic ids (`{prefix}-1`, `{prefix}-2`, ...) for replays and tests.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate_id(&self) -> MessageId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        MessageId(format!("{}-{n}", self.prefix))
    }
}

#[derive(Debug, Clone)]
pub struct StaticModelName(pub String);

impl ModelNameProvider for StaticModelName {
    fn current_model_name(&self) -> String {
        self.0.clone()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCheckpointSink;

impl CheckpointSink for NoopCheckpointSink {
    fn add_checkpoint(&self, _checkpoint: &CheckpointRecord) {}
}

/// Keeps every checkpoint it is handed.
#[derive(Debug, Default)]
pub struct RecordingCheckpointSink {
    records: Mutex<Vec<CheckpointRecord>>,
}

impl RecordingCheckpointSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CheckpointRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CheckpointSink for RecordingCheckpointSink {
    fn add_checkpoint(&self, checkpoint: &CheckpointRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(checkpoint.clone());
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopConversationUpdater;

#[async_trait]
impl ConversationUpdater for NoopConversationUpdater {
    async fn update_conversation_after_message(
        &self,
        _message_id: Option<MessageId>,
    ) -> Result<()> {
        Ok(())
    }
}

/// The synchronous collaborators a dispatcher needs.
#[derive(Clone)]
pub struct Collaborators {
    pub builder: Arc<dyn MessageBuilder>,
    pub checkpoints: Arc<dyn CheckpointSink>,
    pub model_name: Arc<dyn ModelNameProvider>,
    pub ids: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            builder: Arc::new(DefaultMessageBuilder),
            checkpoints: Arc::new(NoopCheckpointSink),
            model_name: Arc::new(StaticModelName(model_name.into())),
            ids: Arc::new(UuidIdGenerator),
        }
    }

    pub fn with_builder(mut self, builder: Arc<dyn MessageBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_checkpoint_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.checkpoints = sink;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_model_name(mut self, model_name: Arc<dyn ModelNameProvider>) -> Self {
        self.model_name = model_name;
        self
    }
}

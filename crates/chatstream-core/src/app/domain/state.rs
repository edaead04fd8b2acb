use crate::app::conversation::{CheckpointRecord, Message};
use crate::app::domain::event::StreamError;
use crate::app::domain::types::{MessageId, ToolCallId};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Per-conversation store mutated only by the dispatcher and the history
/// operations.
///
/// Messages are held behind `Arc` and replaced wholesale on every update, so a
/// reference taken before an update stays an unchanged snapshot and observers
/// can detect changes with `Arc::ptr_eq`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStoreState {
    pub all_messages: Vec<Arc<Message>>,
    /// Absolute index of `all_messages[0]` in the full history.
    pub window_start_index: usize,
    pub total_messages: usize,
    pub streaming_message_id: Option<MessageId>,
    /// Gates cancel requests: the transport only sends a cancel while this is set.
    pub is_streaming: bool,
    pub is_waiting_for_response: bool,
    pub checkpoints: Vec<CheckpointRecord>,
    pub history_folded: bool,
    pub folded_message_count: usize,
    pub error: Option<StreamError>,
    /// Every tool-result id ever materialised as a hidden function-response
    /// message, including ones trimmed out of the window.
    #[serde(skip)]
    pub function_response_ids: HashSet<ToolCallId>,
}

impl ChatStoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.all_messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all_messages.is_empty()
    }

    /// Absolute index one past the last message held in memory.
    pub fn window_end(&self) -> usize {
        self.window_start_index + self.all_messages.len()
    }

    pub fn message_index(&self, id: &MessageId) -> Option<usize> {
        self.all_messages.iter().position(|m| &m.id == id)
    }

    pub fn message(&self, id: &MessageId) -> Option<&Arc<Message>> {
        self.all_messages.iter().find(|m| &m.id == id)
    }

    pub fn streaming_message_index(&self) -> Option<usize> {
        self.streaming_message_id
            .as_ref()
            .and_then(|id| self.message_index(id))
    }

    /// Messages the chat view renders; hidden function-response carriers are skipped.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Arc<Message>> + '_ {
        self.all_messages.iter().filter(|m| !m.is_function_response)
    }

    /// Replace the message at `index` with an updated copy.
    pub fn update_message<F>(&mut self, index: usize, update: F) -> bool
    where
        F: FnOnce(&mut Message),
    {
        let Some(slot) = self.all_messages.get_mut(index) else {
            return false;
        };
        let mut next = Message::clone(slot);
        update(&mut next);
        *slot = Arc::new(next);
        true
    }

    pub fn replace_message(&mut self, index: usize, message: Message) -> bool {
        let Some(slot) = self.all_messages.get_mut(index) else {
            return false;
        };
        *slot = Arc::new(message);
        true
    }

    pub fn push_message(&mut self, message: Message) -> usize {
        self.function_response_ids
            .extend(message.function_response_ids().cloned());
        self.all_messages.push(Arc::new(message));
        self.all_messages.len() - 1
    }

    pub fn remove_message(&mut self, index: usize) -> Option<Arc<Message>> {
        (index < self.all_messages.len()).then(|| self.all_messages.remove(index))
    }

    /// True when a hidden function-response message already carries `id`.
    pub fn has_function_response(&self, id: &ToolCallId) -> bool {
        self.function_response_ids.contains(id)
            || self
                .all_messages
                .iter()
                .any(|m| m.function_response_ids().any(|existing| existing == id))
    }

    /// Append a checkpoint unless one with the same id is already recorded.
    pub fn add_checkpoint(&mut self, checkpoint: CheckpointRecord) -> bool {
        if self.checkpoints.iter().any(|c| c.id == checkpoint.id) {
            return false;
        }
        self.checkpoints.push(checkpoint);
        true
    }

    pub fn checkpoint(&self, id: &str) -> Option<&CheckpointRecord> {
        self.checkpoints.iter().find(|c| c.id.as_str() == id)
    }

    /// End the current turn: no stream target, nothing outstanding.
    pub fn clear_stream_state(&mut self) {
        self.streaming_message_id = None;
        self.is_streaming = false;
        self.is_waiting_for_response = false;
    }

    pub fn rebuild_function_response_index(&mut self) {
        self.function_response_ids = self
            .all_messages
            .iter()
            .flat_map(|m| m.function_response_ids())
            .cloned()
            .collect();
    }
}

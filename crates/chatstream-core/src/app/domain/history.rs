//! Operations that rewrite the history outside the event stream: deleting a
//! message, rolling back to a checkpoint and loading a stored conversation.

use crate::app::conversation::{CheckpointRecord, Message};
use crate::app::domain::state::ChatStoreState;
use crate::app::domain::types::{CheckpointId, MessageId};
use crate::app::domain::window;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A stored window of conversation history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub window_start_index: usize,
    /// Falls back to the end of the window when absent.
    #[serde(default)]
    pub total_messages: Option<usize>,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointRecord>,
}

/// Remove one message from the window.
///
/// Checkpoints past the new end are kept; they still describe persisted history.
pub fn delete_message(state: &mut ChatStoreState, id: &MessageId) -> Result<Arc<Message>> {
    let index = state
        .message_index(id)
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;
    let removed = state
        .remove_message(index)
        .ok_or_else(|| Error::NotFound(format!("message {id}")))?;

    for response_id in removed.function_response_ids() {
        state.function_response_ids.remove(response_id);
    }
    if state.streaming_message_id.as_ref() == Some(id) {
        state.clear_stream_state();
    }
    window::sync_total_after_shrink(state);

    tracing::debug!(
        target: "chatstream::history",
        message_id = %id,
        total = state.total_messages,
        "Deleted message"
    );
    Ok(removed)
}

/// Truncate the history to the state it was in when `checkpoint_id` was taken.
///
/// Returns the number of messages removed.
pub fn restore_to_checkpoint(
    state: &mut ChatStoreState,
    checkpoint_id: &CheckpointId,
) -> Result<usize> {
    let checkpoint = state
        .checkpoint(checkpoint_id.as_str())
        .cloned()
        .ok_or_else(|| Error::NotFound(format!("checkpoint {checkpoint_id}")))?;

    if checkpoint.message_index < state.window_start_index {
        return Err(Error::InvalidOperation(format!(
            "checkpoint {checkpoint_id} is before the loaded window (message {}, window starts at {})",
            checkpoint.message_index, state.window_start_index
        )));
    }

    let keep = (checkpoint.message_index - state.window_start_index).min(state.len());
    let truncated: Vec<Arc<Message>> = state.all_messages.drain(keep..).collect();
    for message in &truncated {
        for response_id in message.function_response_ids() {
            state.function_response_ids.remove(response_id);
        }
    }

    state
        .checkpoints
        .retain(|c| c.message_index <= checkpoint.message_index);
    state.clear_stream_state();
    state.error = None;
    window::sync_total_after_shrink(state);

    tracing::info!(
        target: "chatstream::history",
        checkpoint_id = %checkpoint_id,
        removed = truncated.len(),
        "Restored to checkpoint"
    );
    Ok(truncated.len())
}

/// Replace the whole store with a stored window.
pub fn load_history(state: &mut ChatStoreState, snapshot: HistorySnapshot, max_window: usize) {
    let HistorySnapshot {
        messages,
        window_start_index,
        total_messages,
        checkpoints,
    } = snapshot;

    let window_end = window_start_index + messages.len();
    *state = ChatStoreState {
        all_messages: messages.into_iter().map(Arc::new).collect(),
        window_start_index,
        total_messages: total_messages.unwrap_or(window_end).max(window_end),
        checkpoints,
        ..ChatStoreState::default()
    };
    state.rebuild_function_response_index();
    window::prune_checkpoints(state);

    let trimmed = window::trim_window_from_top(state, max_window);
    // A reload starts a fresh view; only trims of this load count as folded.
    state.history_folded = trimmed > 0;
    state.folded_message_count = trimmed;
    window::sync_total_after_growth(state);

    tracing::debug!(
        target: "chatstream::history",
        messages = state.len(),
        window_start = state.window_start_index,
        total = state.total_messages,
        "Loaded history"
    );
}

/// Record that the host persisted `id`. Returns false when the message is not
/// in the window.
pub fn mark_persisted(state: &mut ChatStoreState, id: &MessageId) -> bool {
    match state.message_index(id) {
        Some(index) => state.update_message(index, |m| m.local_only = false),
        None => false,
    }
}

//! Sliding-window bookkeeping for the in-memory message log.

use crate::app::domain::state::ChatStoreState;

/// Default cap on messages held in memory, hidden function responses included.
pub const MAX_WINDOW_MESSAGES: usize = 800;

/// Drop the oldest messages until at most `max` remain.
///
/// Returns the number of messages removed. Checkpoints that pointed into the
/// evicted range are discarded along with them.
pub fn trim_window_from_top(state: &mut ChatStoreState, max: usize) -> usize {
    let len = state.all_messages.len();
    if len <= max {
        return 0;
    }

    let removed = len - max;
    state.all_messages.drain(..removed);
    state.window_start_index += removed;
    prune_checkpoints(state);

    state.history_folded = true;
    state.folded_message_count += removed;

    tracing::debug!(
        target: "chatstream::window",
        removed,
        window_start = state.window_start_index,
        folded = state.folded_message_count,
        "Trimmed message window"
    );

    removed
}

/// Discard checkpoints that reference history no longer held in memory.
pub fn prune_checkpoints(state: &mut ChatStoreState) {
    let start = state.window_start_index;
    state.checkpoints.retain(|c| c.message_index >= start);
}

/// Resynchronise the total after the log grew; never lowers it.
pub fn sync_total_after_growth(state: &mut ChatStoreState) {
    state.total_messages = state.total_messages.max(state.window_end());
}

/// Recompute the total after an operation that shortened the history.
pub fn sync_total_after_shrink(state: &mut ChatStoreState) {
    state.total_messages = state.window_end();
}

/// Bring the window back within bounds after messages were appended.
pub fn enforce_after_growth(state: &mut ChatStoreState, max: usize) -> usize {
    let removed = trim_window_from_top(state, max);
    sync_total_after_growth(state);
    removed
}

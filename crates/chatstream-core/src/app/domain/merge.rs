use crate::app::conversation::{ToolCall, ToolStatus};

/// Union two snapshots of a message's tool calls by id.
///
/// Entries already in `existing` win, including their status; `rebuilt` only
/// fills fields they never populated and supplies calls they lack.
pub fn merge_tools(existing: &[ToolCall], rebuilt: Vec<ToolCall>) -> Vec<ToolCall> {
    let mut merged = existing.to_vec();
    for tool in rebuilt {
        if let Some(current) = merged.iter_mut().find(|t| t.id == tool.id) {
            current.fill_missing_from(&tool);
        } else {
            merged.push(tool);
        }
    }
    merged
}

/// Move a tool to `status` unless that would pull it out of a terminal state.
pub fn advance_status(tool: &mut ToolCall, status: ToolStatus) -> bool {
    if tool.status.is_terminal() && !status.is_terminal() {
        return false;
    }
    tool.status = status;
    true
}

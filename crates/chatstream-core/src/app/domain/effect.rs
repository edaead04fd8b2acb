use crate::app::domain::types::MessageId;

/// Side effects requested by the dispatcher. The reducer never performs
/// them itself; `ChatSession` interprets them after the state is updated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Refresh conversation-level metadata once a turn has completed.
    UpdateConversationAfterMessage { message_id: Option<MessageId> },
}

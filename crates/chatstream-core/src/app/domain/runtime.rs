//! Owns a store and interprets the effects its dispatcher asks for.

use crate::app::collaborators::{ConversationUpdater, NoopConversationUpdater};
use crate::app::conversation::Message;
use crate::app::domain::effect::Effect;
use crate::app::domain::event::StreamEvent;
use crate::app::domain::history::{self, HistorySnapshot};
use crate::app::domain::reduce::ChunkDispatcher;
use crate::app::domain::state::ChatStoreState;
use crate::app::domain::types::{CheckpointId, MessageId};
use crate::error::Result;
use std::sync::Arc;

pub struct ChatSession {
    state: ChatStoreState,
    dispatcher: ChunkDispatcher,
    updater: Arc<dyn ConversationUpdater>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &self.state)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    pub fn new(dispatcher: ChunkDispatcher) -> Self {
        Self {
            state: ChatStoreState::new(),
            dispatcher,
            updater: Arc::new(NoopConversationUpdater),
        }
    }

    pub fn with_updater(mut self, updater: Arc<dyn ConversationUpdater>) -> Self {
        self.updater = updater;
        self
    }

    pub fn state(&self) -> &ChatStoreState {
        &self.state
    }

    pub fn into_state(self) -> ChatStoreState {
        self.state
    }

    pub fn begin_turn(&mut self, text: &str) -> MessageId {
        self.dispatcher.begin_turn(&mut self.state, text)
    }

    /// Dispatch one event and start any effects it produced. Effects are
    /// not awaited.
    pub fn apply(&mut self, event: StreamEvent) {
        let effects = self.dispatcher.dispatch(&mut self.state, event);
        for effect in effects {
            self.spawn_effect(effect);
        }
    }

    pub fn delete_message(&mut self, id: &MessageId) -> Result<Arc<Message>> {
        history::delete_message(&mut self.state, id)
    }

    pub fn restore_to_checkpoint(&mut self, id: &CheckpointId) -> Result<usize> {
        history::restore_to_checkpoint(&mut self.state, id)
    }

    pub fn load_history(&mut self, snapshot: HistorySnapshot) {
        let max = self.dispatcher.max_window_messages();
        history::load_history(&mut self.state, snapshot, max);
    }

    pub fn mark_persisted(&mut self, id: &MessageId) -> bool {
        history::mark_persisted(&mut self.state, id)
    }

    fn spawn_effect(&self, effect: Effect) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                target: "chatstream::runtime",
                ?effect,
                "No tokio runtime available; skipping effect"
            );
            return;
        };

        match effect {
            Effect::UpdateConversationAfterMessage { message_id } => {
                let updater = Arc::clone(&self.updater);
                handle.spawn(async move {
                    let label = message_id.as_ref().map(ToString::to_string);
                    if let Err(e) = updater.update_conversation_after_message(message_id).await {
                        tracing::warn!(
                            target: "chatstream::runtime",
                            message_id = ?label,
                            error = %e,
                            "Conversation update failed"
                        );
                    }
                });
            }
        }
    }
}

use crate::app::collaborators::{Collaborators, StreamTextParser};
use crate::app::conversation::{CheckpointRecord, Message, Timing, ToolResult, ToolStatus};
use crate::app::domain::effect::Effect;
use crate::app::domain::event::{
    Content, ContentChunk, PendingToolCall, StreamError, StreamEvent, ToolStatusUpdate,
};
use crate::app::domain::merge::{advance_status, merge_tools};
use crate::app::domain::state::ChatStoreState;
use crate::app::domain::types::{MessageId, now_millis};
use crate::app::domain::window::{self, MAX_WINDOW_MESSAGES};
use crate::app::stream_parser::InlineToolCallParser;
use std::collections::HashSet;
use std::sync::Arc;

/// Applies stream events to a [`ChatStoreState`], one at a time.
///
/// Handlers never fail: fields missing from an event leave the corresponding
/// state untouched.
pub struct ChunkDispatcher {
    collaborators: Collaborators,
    parser: Box<dyn StreamTextParser>,
    max_window_messages: usize,
}

impl std::fmt::Debug for ChunkDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkDispatcher")
            .field("max_window_messages", &self.max_window_messages)
            .finish_non_exhaustive()
    }
}

impl ChunkDispatcher {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            collaborators,
            parser: Box::new(InlineToolCallParser::new()),
            max_window_messages: MAX_WINDOW_MESSAGES,
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn StreamTextParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_max_window_messages(mut self, max: usize) -> Self {
        self.max_window_messages = max;
        self
    }

    pub fn max_window_messages(&self) -> usize {
        self.max_window_messages
    }

    /// Append the user's message and an empty assistant placeholder, and make
    /// the placeholder the stream target.
    pub fn begin_turn(&mut self, state: &mut ChatStoreState, text: &str) -> MessageId {
        let before = state.len();
        let now = now_millis();

        let user_id = self.collaborators.ids.generate_id();
        state.push_message(Message::user(user_id, text, now));

        let assistant_id = self.push_placeholder(state);
        state.error = None;

        tracing::debug!(
            target: "chatstream::dispatch",
            message_id = %assistant_id,
            "Started turn"
        );

        self.settle_window(state, before);
        assistant_id
    }

    pub fn dispatch(&mut self, state: &mut ChatStoreState, event: StreamEvent) -> Vec<Effect> {
        let before = state.len();
        tracing::trace!(
            target: "chatstream::dispatch",
            kind = event.kind(),
            streaming_message_id = ?state.streaming_message_id,
            "Dispatching stream event"
        );

        let effects = match event {
            StreamEvent::Chunk { chunk } => {
                self.handle_chunk(state, &chunk);
                vec![]
            }

            StreamEvent::ToolsExecuting {
                content,
                pending_tool_calls,
            } => {
                self.handle_tools_executing(state, content.as_ref(), &pending_tool_calls);
                vec![]
            }

            StreamEvent::ToolStatus { tool_status } => {
                if let Some(update) = tool_status {
                    handle_tool_status(state, update);
                }
                vec![]
            }

            StreamEvent::AwaitingConfirmation {
                content,
                pending_tool_calls,
                tool_results,
                checkpoints,
            } => {
                self.handle_awaiting_confirmation(
                    state,
                    content.as_ref(),
                    &pending_tool_calls,
                    &tool_results,
                    checkpoints,
                );
                vec![]
            }

            StreamEvent::ToolIteration {
                content,
                tool_results,
                checkpoints,
            } => {
                self.handle_tool_iteration(state, content.as_ref(), &tool_results, checkpoints);
                vec![]
            }

            StreamEvent::Complete {
                content,
                checkpoints,
            } => self.handle_complete(state, content.as_ref(), checkpoints),

            StreamEvent::Checkpoints { checkpoints } => {
                self.record_checkpoints(state, checkpoints);
                vec![]
            }

            StreamEvent::Cancelled { timing } => {
                self.handle_cancelled(state, timing.as_ref());
                vec![]
            }

            StreamEvent::Error { error } => {
                self.handle_error(state, error.unwrap_or_default());
                vec![]
            }
        };

        self.settle_window(state, before);
        effects
    }

    fn settle_window(&self, state: &mut ChatStoreState, before: usize) {
        let after = state.len();
        if after > before {
            window::enforce_after_growth(state, self.max_window_messages);
        } else if after < before {
            window::sync_total_after_shrink(state);
        }
    }

    fn push_placeholder(&self, state: &mut ChatStoreState) -> MessageId {
        let id = self.collaborators.ids.generate_id();
        let model = self.collaborators.model_name.current_model_name();
        state.push_message(Message::assistant_placeholder(id.clone(), model, now_millis()));
        state.streaming_message_id = Some(id.clone());
        state.is_streaming = true;
        state.is_waiting_for_response = true;
        id
    }

    fn handle_chunk(&mut self, state: &mut ChatStoreState, chunk: &ContentChunk) {
        let Some(index) = state.streaming_message_index() else {
            tracing::debug!(
                target: "chatstream::dispatch",
                "Chunk received with no streaming message"
            );
            return;
        };

        let parser = &mut self.parser;
        state.update_message(index, |message| {
            for part in &chunk.delta {
                if let Some(text) = part.text.as_deref().filter(|t| !t.is_empty()) {
                    if part.thought {
                        parser.add_text_to_message(message, text, true);
                    } else {
                        parser.process_streaming_text(message, text);
                    }
                }
                if let Some(call) = &part.function_call {
                    parser.handle_function_call_part(call, message);
                }
            }

            if chunk.done
                && let Some(usage) = &chunk.usage
            {
                message.metadata.merge_usage(usage);
            }
            if let Some(start) = chunk.thinking_start_time {
                message.metadata.timing.thinking_start_time = Some(start);
            }
            if !chunk.delta.is_empty() {
                let count = message.metadata.timing.chunk_count.unwrap_or(0);
                message.metadata.timing.chunk_count = Some(count + 1);
            }
        });
    }

    /// Rebuild a message from finalized content while keeping what the
    /// reducer already knows: tool entries, metadata and the model version.
    fn rebuild(&self, existing: &Message, content: Option<&Content>) -> Message {
        let Some(content) = content else {
            return existing.clone();
        };

        let mut rebuilt = self
            .collaborators
            .builder
            .content_to_message(content, &existing.id);

        if rebuilt.parts.is_empty() && rebuilt.content.is_empty() {
            rebuilt.parts.clone_from(&existing.parts);
            rebuilt.content.clone_from(&existing.content);
        }
        rebuilt.tools = merge_tools(&existing.tools, std::mem::take(&mut rebuilt.tools));

        let server_model = rebuilt.metadata.model_version.take();
        rebuilt.metadata.fill_missing_from(&existing.metadata);
        rebuilt.metadata.model_version = existing.metadata.model_version.clone().or(server_model);

        rebuilt.role = existing.role;
        rebuilt.timestamp = existing.timestamp;
        rebuilt.streaming = existing.streaming;
        rebuilt.local_only = existing.local_only;
        rebuilt
    }

    fn handle_tools_executing(
        &mut self,
        state: &mut ChatStoreState,
        content: Option<&Content>,
        pending: &[PendingToolCall],
    ) {
        // Tools run with no text streaming, but the transport only routes a
        // cancel request while this flag is set.
        state.is_streaming = true;

        let Some(index) = state.streaming_message_index() else {
            return;
        };
        let existing = Arc::clone(&state.all_messages[index]);
        let mut next = self.rebuild(&existing, content);

        for tool in &mut next.tools {
            match pending.iter().position(|p| p.id == tool.id) {
                Some(0) => {
                    advance_status(tool, ToolStatus::Executing);
                }
                Some(_) => {
                    advance_status(tool, ToolStatus::Queued);
                }
                None if tool.status == ToolStatus::Streaming => tool.status = ToolStatus::Queued,
                None => {}
            }
        }
        next.local_only = false;

        tracing::debug!(
            target: "chatstream::dispatch",
            message_id = %next.id,
            pending = pending.len(),
            "Tools executing"
        );
        state.replace_message(index, next);
    }

    fn handle_awaiting_confirmation(
        &mut self,
        state: &mut ChatStoreState,
        content: Option<&Content>,
        pending: &[PendingToolCall],
        tool_results: &[ToolResult],
        checkpoints: Vec<CheckpointRecord>,
    ) {
        if let Some(index) = state.streaming_message_index() {
            let existing = Arc::clone(&state.all_messages[index]);
            let mut next = self.rebuild(&existing, content);

            for tool in &mut next.tools {
                if pending.iter().any(|p| p.id == tool.id) {
                    advance_status(tool, ToolStatus::AwaitingApproval);
                } else if let Some(result) = tool_results.iter().find(|r| r.id == tool.id) {
                    tool.status = result.terminal_status();
                    tool.result = Some(result.clone());
                } else if tool.status == ToolStatus::Streaming {
                    tool.status = ToolStatus::Queued;
                }
            }
            next.local_only = false;
            next.streaming = false;
            state.replace_message(index, next);
        }

        self.append_function_responses(state, tool_results);
        self.record_checkpoints(state, checkpoints);

        // The user has to act; the caller owns `is_waiting_for_response`.
        state.is_streaming = false;
    }

    fn handle_tool_iteration(
        &mut self,
        state: &mut ChatStoreState,
        content: Option<&Content>,
        tool_results: &[ToolResult],
        checkpoints: Vec<CheckpointRecord>,
    ) {
        let cancelled = tool_results.iter().any(|r| r.cancelled);

        if let Some(index) = state.streaming_message_index() {
            let mut flushed = Message::clone(&state.all_messages[index]);
            self.parser.flush_tool_call_buffer(&mut flushed);

            let mut next = self.rebuild(&flushed, content);

            for tool in &mut next.tools {
                let result = tool_results.iter().find(|r| r.id == tool.id);
                tool.status = match result {
                    Some(result) => result.terminal_status(),
                    None if tool.status == ToolStatus::Error => ToolStatus::Error,
                    None => ToolStatus::Success,
                };
                if let Some(result) = result {
                    tool.result = Some(result.clone());
                }
            }
            next.local_only = false;
            next.streaming = false;
            state.replace_message(index, next);
        }

        self.append_function_responses(state, tool_results);
        self.record_checkpoints(state, checkpoints);

        if cancelled {
            tracing::debug!(
                target: "chatstream::dispatch",
                "Tool iteration cancelled; ending turn"
            );
            state.clear_stream_state();
        } else {
            let id = self.push_placeholder(state);
            tracing::debug!(
                target: "chatstream::dispatch",
                message_id = %id,
                "Tool iteration complete; awaiting next model turn"
            );
        }
    }

    fn handle_complete(
        &mut self,
        state: &mut ChatStoreState,
        content: Option<&Content>,
        checkpoints: Vec<CheckpointRecord>,
    ) -> Vec<Effect> {
        let mut message_id = None;

        if let Some(index) = state.streaming_message_index() {
            let mut flushed = Message::clone(&state.all_messages[index]);
            self.parser.flush_tool_call_buffer(&mut flushed);

            let mut next = self.rebuild(&flushed, content);
            next.streaming = false;
            next.local_only = false;

            message_id = Some(next.id.clone());
            state.replace_message(index, next);
        } else {
            tracing::debug!(
                target: "chatstream::dispatch",
                "Complete received with no streaming message"
            );
        }

        self.record_checkpoints(state, checkpoints);
        state.clear_stream_state();

        vec![Effect::UpdateConversationAfterMessage { message_id }]
    }

    fn handle_cancelled(&mut self, state: &mut ChatStoreState, timing: Option<&Timing>) {
        let index = match &state.streaming_message_id {
            Some(_) => state.streaming_message_index(),
            // The cancel path can clear the id before this event lands.
            None => state
                .all_messages
                .iter()
                .rposition(|m| m.is_assistant() && !m.is_function_response)
                .filter(|&i| !state.all_messages[i].streaming),
        };

        if let Some(index) = index {
            self.settle_interrupted(state, index, |message| {
                if let Some(timing) = timing {
                    message.metadata.merge_timing(timing);
                }
                for tool in &mut message.tools {
                    if !tool.status.is_terminal() {
                        tool.status = ToolStatus::Error;
                    }
                }
                message.local_only = false;
            });
        }

        tracing::debug!(target: "chatstream::dispatch", "Turn cancelled");
        state.clear_stream_state();
    }

    fn handle_error(&mut self, state: &mut ChatStoreState, error: StreamError) {
        tracing::warn!(
            target: "chatstream::dispatch",
            code = %error.code,
            message = %error.message,
            "Stream error"
        );
        state.error = Some(error);

        if let Some(index) = state.streaming_message_index() {
            self.settle_interrupted(state, index, |_| {});
        }
        state.clear_stream_state();
    }

    /// Delete the message at `index` if nothing was ever produced for it;
    /// otherwise stop it streaming and apply `finish`.
    fn settle_interrupted<F>(&mut self, state: &mut ChatStoreState, index: usize, finish: F)
    where
        F: FnOnce(&mut Message),
    {
        let id = state.all_messages[index].id.clone();
        let parser = &mut self.parser;

        if state.all_messages[index].is_empty() {
            parser.discard(&id);
            state.remove_message(index);
            tracing::debug!(
                target: "chatstream::dispatch",
                message_id = %id,
                "Removed empty message"
            );
            return;
        }

        state.update_message(index, |message| {
            parser.flush_tool_call_buffer(message);
            message.streaming = false;
            finish(message);
        });
    }

    fn append_function_responses(&self, state: &mut ChatStoreState, results: &[ToolResult]) {
        let mut seen = HashSet::new();
        let fresh: Vec<ToolResult> = results
            .iter()
            .filter(|r| !state.has_function_response(&r.id) && seen.insert(r.id.clone()))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }

        let id = self.collaborators.ids.generate_id();
        tracing::debug!(
            target: "chatstream::dispatch",
            message_id = %id,
            results = fresh.len(),
            "Appending function response message"
        );
        state.push_message(Message::function_response(id, &fresh, now_millis()));
    }

    fn record_checkpoints(&self, state: &mut ChatStoreState, checkpoints: Vec<CheckpointRecord>) {
        for checkpoint in checkpoints {
            if checkpoint.message_index < state.window_start_index {
                continue;
            }
            if state.add_checkpoint(checkpoint.clone()) {
                self.collaborators.checkpoints.add_checkpoint(&checkpoint);
            }
        }
    }
}

/// Live status change for one tool.
///
/// The owner is the streaming message when it carries the tool, else the most
/// recent assistant message that does.
fn handle_tool_status(state: &mut ChatStoreState, update: ToolStatusUpdate) {
    let Some(status) = update.status else {
        tracing::debug!(
            target: "chatstream::dispatch",
            tool_id = %update.id,
            "Tool status update without a status"
        );
        return;
    };

    let owns = |m: &Arc<Message>| m.is_assistant() && m.has_tool(&update.id);
    let owner = state
        .streaming_message_index()
        .filter(|&i| owns(&state.all_messages[i]))
        .or_else(|| state.all_messages.iter().rposition(owns));

    let Some(index) = owner else {
        tracing::debug!(
            target: "chatstream::dispatch",
            tool_id = %update.id,
            "Tool status for unknown tool"
        );
        return;
    };

    let regresses = state.all_messages[index]
        .tool(&update.id)
        .is_some_and(|t| t.status.is_terminal() && !status.is_terminal());
    if regresses {
        tracing::debug!(
            target: "chatstream::dispatch",
            tool_id = %update.id,
            status = %status,
            "Ignoring status update for finished tool"
        );
        return;
    }

    state.update_message(index, |message| {
        if let Some(tool) = message.tool_mut(&update.id) {
            tool.status = status;
            if let Some(result) = update.result {
                tool.result = Some(result);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::collaborators::{RecordingCheckpointSink, SequentialIdGenerator};
    use crate::app::conversation::{CheckpointAnchor, MessagePart, ToolCall, UsageMetadata};
    use crate::app::domain::event::{ContentPart, FunctionCall};
    use crate::app::domain::types::ToolCallId;
    use serde_json::json;

    fn dispatcher() -> ChunkDispatcher {
        let collaborators = Collaborators::new("test-model")
            .with_id_generator(Arc::new(SequentialIdGenerator::new("msg")));
        ChunkDispatcher::new(collaborators)
    }

    fn started(dispatcher: &mut ChunkDispatcher) -> (ChatStoreState, MessageId) {
        let mut state = ChatStoreState::new();
        let id = dispatcher.begin_turn(&mut state, "hi");
        (state, id)
    }

    fn chunk(parts: Vec<ContentPart>) -> StreamEvent {
        StreamEvent::Chunk {
            chunk: ContentChunk {
                delta: parts,
                ..ContentChunk::default()
            },
        }
    }

    fn with_tools(state: &mut ChatStoreState, id: &MessageId, tools: &[(&str, ToolStatus)]) {
        let index = state.message_index(id).expect("message present");
        state.update_message(index, |m| {
            for (tool_id, status) in tools {
                let mut tool = ToolCall::new(*tool_id, "bash", json!({}));
                tool.status = *status;
                m.tools.push(tool);
            }
        });
    }

    fn tool_status(state: &ChatStoreState, message: &MessageId, tool: &str) -> ToolStatus {
        state
            .message(message)
            .and_then(|m| m.tool(&ToolCallId::from(tool)).map(|t| t.status))
            .expect("tool present")
    }

    #[test]
    fn test_begin_turn_sets_stream_target() {
        let mut dispatcher = dispatcher();
        let (state, id) = started(&mut dispatcher);

        assert_eq!(state.len(), 2);
        assert_eq!(state.streaming_message_id.as_ref(), Some(&id));
        assert!(state.is_streaming);
        assert!(state.is_waiting_for_response);
        assert_eq!(state.total_messages, 2);

        let placeholder = state.message(&id).expect("placeholder");
        assert!(placeholder.streaming);
        assert_eq!(
            placeholder.metadata.model_version.as_deref(),
            Some("test-model")
        );
    }

    #[test]
    fn test_chunk_without_target_is_noop() {
        let mut dispatcher = dispatcher();
        let mut state = ChatStoreState::new();
        let effects = dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("x")]));
        assert!(effects.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_done_chunk_copies_usage_but_not_model_version() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(
            &mut state,
            StreamEvent::Chunk {
                chunk: ContentChunk {
                    delta: vec![ContentPart::text("done")],
                    done: true,
                    usage: Some(UsageMetadata {
                        prompt_token_count: Some(3),
                        total_token_count: Some(9),
                        ..UsageMetadata::default()
                    }),
                    thinking_start_time: Some(1234),
                    model_version: Some("server-model".into()),
                },
            },
        );

        let message = state.message(&id).expect("message");
        let usage = message.metadata.usage.clone().unwrap_or_default();
        assert_eq!(usage.total_token_count, Some(9));
        assert_eq!(message.metadata.model_version.as_deref(), Some("test-model"));
        assert_eq!(message.metadata.timing.thinking_start_time, Some(1234));
        assert_eq!(message.metadata.timing.chunk_count, Some(1));
    }

    #[test]
    fn test_usage_ignored_until_final_chunk() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(
            &mut state,
            StreamEvent::Chunk {
                chunk: ContentChunk {
                    delta: vec![ContentPart::text("partial")],
                    done: false,
                    usage: Some(UsageMetadata {
                        total_token_count: Some(4),
                        ..UsageMetadata::default()
                    }),
                    ..ContentChunk::default()
                },
            },
        );

        let message = state.message(&id).expect("message");
        assert_eq!(message.metadata.usage, None);
        assert_eq!(message.content, "partial");
    }

    #[test]
    fn test_empty_delta_not_counted_as_chunk() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("a")]));
        dispatcher.dispatch(
            &mut state,
            StreamEvent::Chunk {
                chunk: ContentChunk {
                    thinking_start_time: Some(7),
                    ..ContentChunk::default()
                },
            },
        );
        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("b")]));

        let message = state.message(&id).expect("message");
        assert_eq!(message.metadata.timing.chunk_count, Some(2));
        assert_eq!(message.metadata.timing.thinking_start_time, Some(7));
    }

    #[test]
    fn test_tool_iteration_flushes_held_back_text() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("x <t")]));
        assert_eq!(state.message(&id).expect("message").content, "x ");

        dispatcher.dispatch(
            &mut state,
            StreamEvent::ToolIteration {
                content: None,
                tool_results: vec![],
                checkpoints: vec![],
            },
        );

        let message = state.message(&id).expect("message");
        assert_eq!(message.content, "x <t");
        assert!(!message.streaming);
    }

    #[test]
    fn test_complete_with_tool_name_checkpoint_finalizes_turn() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        let event: StreamEvent = serde_json::from_value(serde_json::json!({
            "kind": "complete",
            "content": {"text": "Hello world"},
            "checkpoints": [
                {"id": "cp", "timestamp": 1, "toolName": "user_message_after", "messageIndex": 0}
            ]
        }))
        .expect("event should parse");
        let effects = dispatcher.dispatch(&mut state, event);

        let message = state.message(&id).expect("message");
        assert_eq!(message.content, "Hello world");
        assert!(!message.streaming);
        assert!(!state.is_streaming);
        assert_eq!(state.checkpoints.len(), 1);
        assert_eq!(state.checkpoints[0].anchor, CheckpointAnchor::UserMessageAfter);
        assert_eq!(
            effects,
            vec![Effect::UpdateConversationAfterMessage {
                message_id: Some(id)
            }]
        );
    }

    #[test]
    fn test_tool_status_without_status_is_noop() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        dispatcher.dispatch(
            &mut state,
            chunk(vec![ContentPart::function_call(FunctionCall {
                id: Some("t1".into()),
                name: "bash".into(),
                args: serde_json::json!({}),
            })]),
        );
        let before = Arc::clone(state.all_messages.last().expect("message"));

        let event: StreamEvent = serde_json::from_value(
            serde_json::json!({"kind": "tool-status", "toolStatus": {"id": "t1"}}),
        )
        .expect("event should parse");
        dispatcher.dispatch(&mut state, event);

        let after = state.all_messages.last().expect("message");
        assert!(Arc::ptr_eq(&before, after));
        assert_eq!(tool_status(&state, &id, "t1"), ToolStatus::Streaming);
    }

    #[test]
    fn test_thought_parts_bypass_markup_detection() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(
            &mut state,
            chunk(vec![ContentPart::thought(
                "<tool_call>{\"name\": \"bash\"}</tool_call>",
            )]),
        );

        let message = state.message(&id).expect("message");
        assert!(message.tools.is_empty());
        assert_eq!(message.content, "");
        assert!(matches!(
            message.parts.first(),
            Some(MessagePart::Text { thought: true, .. })
        ));
    }

    #[test]
    fn test_chunk_replaces_message_arc() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        let before = Arc::clone(state.message(&id).expect("message"));

        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("a")]));

        let after = state.message(&id).expect("message");
        assert!(!Arc::ptr_eq(&before, after));
        assert_eq!(before.content, "");
    }

    #[test]
    fn test_tools_executing_forces_streaming_and_merges() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        with_tools(&mut state, &id, &[("t1", ToolStatus::Streaming)]);
        state.is_streaming = false;

        let content = Content {
            parts: vec![ContentPart::function_call(
                crate::app::domain::event::FunctionCall {
                    id: Some("t2".into()),
                    name: "grep".into(),
                    args: json!({}),
                },
            )],
            model_version: Some("server-model".into()),
            ..Content::default()
        };
        dispatcher.dispatch(
            &mut state,
            StreamEvent::ToolsExecuting {
                content: Some(content),
                pending_tool_calls: vec!["t2".into()],
            },
        );

        assert!(state.is_streaming);
        assert_eq!(tool_status(&state, &id, "t2"), ToolStatus::Executing);
        assert_eq!(tool_status(&state, &id, "t1"), ToolStatus::Queued);
        let message = state.message(&id).expect("message");
        assert!(!message.local_only);
        assert_eq!(message.metadata.model_version.as_deref(), Some("test-model"));
    }

    #[test]
    fn test_tool_status_falls_back_to_latest_owner() {
        let mut dispatcher = dispatcher();
        let (mut state, first) = started(&mut dispatcher);
        with_tools(&mut state, &first, &[("t1", ToolStatus::Queued)]);
        dispatcher.dispatch(
            &mut state,
            StreamEvent::Complete {
                content: None,
                checkpoints: vec![],
            },
        );
        assert!(state.streaming_message_id.is_none());

        dispatcher.dispatch(
            &mut state,
            StreamEvent::ToolStatus {
                tool_status: Some(ToolStatusUpdate {
                    id: "t1".into(),
                    status: Some(ToolStatus::Executing),
                    result: None,
                }),
            },
        );

        assert_eq!(tool_status(&state, &first, "t1"), ToolStatus::Executing);
    }

    #[test]
    fn test_tool_status_for_unknown_tool_is_noop() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        let before = Arc::clone(state.message(&id).expect("message"));

        dispatcher.dispatch(
            &mut state,
            StreamEvent::ToolStatus {
                tool_status: Some(ToolStatusUpdate {
                    id: "missing".into(),
                    status: Some(ToolStatus::Executing),
                    result: None,
                }),
            },
        );

        assert!(Arc::ptr_eq(&before, state.message(&id).expect("message")));
    }

    #[test]
    fn test_tool_status_keeps_result_when_absent() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        with_tools(&mut state, &id, &[("t1", ToolStatus::Executing)]);
        let result = ToolResult {
            id: "t1".into(),
            name: "bash".into(),
            response: json!("ok"),
            cancelled: false,
            rejected: false,
        };

        for (status, result) in [
            (ToolStatus::Success, Some(result.clone())),
            (ToolStatus::Error, None),
        ] {
            dispatcher.dispatch(
                &mut state,
                StreamEvent::ToolStatus {
                    tool_status: Some(ToolStatusUpdate {
                        id: "t1".into(),
                        status: Some(status),
                        result,
                    }),
                },
            );
        }

        let message = state.message(&id).expect("message");
        let tool = message.tool(&ToolCallId::from("t1")).expect("tool");
        assert_eq!(tool.status, ToolStatus::Error);
        assert_eq!(tool.result.as_ref(), Some(&result));
    }

    #[test]
    fn test_awaiting_confirmation_assigns_statuses() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        with_tools(
            &mut state,
            &id,
            &[
                ("ask", ToolStatus::Streaming),
                ("auto", ToolStatus::Streaming),
                ("denied", ToolStatus::Streaming),
                ("later", ToolStatus::Streaming),
            ],
        );
        let results = vec![
            ToolResult {
                id: "auto".into(),
                name: "read_file".into(),
                response: json!({"content": "x"}),
                cancelled: false,
                rejected: false,
            },
            ToolResult {
                id: "denied".into(),
                name: "bash".into(),
                response: json!(null),
                cancelled: false,
                rejected: true,
            },
        ];

        dispatcher.dispatch(
            &mut state,
            StreamEvent::AwaitingConfirmation {
                content: None,
                pending_tool_calls: vec!["ask".into()],
                tool_results: results,
                checkpoints: vec![],
            },
        );

        assert_eq!(tool_status(&state, &id, "ask"), ToolStatus::AwaitingApproval);
        assert_eq!(tool_status(&state, &id, "auto"), ToolStatus::Success);
        assert_eq!(tool_status(&state, &id, "denied"), ToolStatus::Error);
        assert_eq!(tool_status(&state, &id, "later"), ToolStatus::Queued);
        assert!(!state.is_streaming);
        assert!(state.is_waiting_for_response);

        let hidden: Vec<_> = state
            .all_messages
            .iter()
            .filter(|m| m.is_function_response)
            .collect();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].parts.len(), 2);
        assert_eq!(state.total_messages, 3);
    }

    #[test]
    fn test_tool_iteration_starts_next_turn() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        with_tools(&mut state, &id, &[("t1", ToolStatus::Executing)]);

        dispatcher.dispatch(
            &mut state,
            StreamEvent::ToolIteration {
                content: None,
                tool_results: vec![ToolResult {
                    id: "t1".into(),
                    name: "bash".into(),
                    response: json!("ok"),
                    cancelled: false,
                    rejected: false,
                }],
                checkpoints: vec![],
            },
        );

        assert_eq!(tool_status(&state, &id, "t1"), ToolStatus::Success);
        let next = state.streaming_message_id.clone().expect("new placeholder");
        assert_ne!(next, id);
        assert!(state.is_streaming);
        assert!(state.is_waiting_for_response);
        let last = state.all_messages.last().expect("placeholder");
        assert_eq!(last.id, next);
        assert!(last.is_empty());
        assert!(!state.message(&id).expect("message").streaming);
    }

    #[test]
    fn test_complete_flushes_inline_buffer_and_emits_effect() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        dispatcher.dispatch(
            &mut state,
            chunk(vec![ContentPart::text(
                "ok<tool_call>{\"name\": \"bash\", \"arguments\": {}}",
            )]),
        );

        let effects = dispatcher.dispatch(
            &mut state,
            StreamEvent::Complete {
                content: None,
                checkpoints: vec![],
            },
        );

        let message = state.message(&id).expect("message");
        assert_eq!(message.tools.len(), 1);
        assert_eq!(message.content, "ok");
        assert!(!message.streaming);
        assert_eq!(
            effects,
            vec![Effect::UpdateConversationAfterMessage {
                message_id: Some(id.clone())
            }]
        );
    }

    #[test]
    fn test_checkpoints_go_to_state_and_sink() {
        let sink = Arc::new(RecordingCheckpointSink::new());
        let collaborators = Collaborators::new("m").with_checkpoint_sink(sink.clone());
        let mut dispatcher = ChunkDispatcher::new(collaborators);
        let mut state = ChatStoreState::new();
        let checkpoint = CheckpointRecord {
            id: "cp-1".into(),
            timestamp: 5,
            anchor: CheckpointAnchor::UserMessageBefore,
            message_index: 0,
        };

        for _ in 0..2 {
            dispatcher.dispatch(
                &mut state,
                StreamEvent::Checkpoints {
                    checkpoints: vec![checkpoint.clone()],
                },
            );
        }

        assert_eq!(state.checkpoints, vec![checkpoint.clone()]);
        assert_eq!(sink.records(), vec![checkpoint]);
    }

    #[test]
    fn test_cancel_keeps_partial_message_and_fails_open_tools() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("partial")]));
        with_tools(
            &mut state,
            &id,
            &[
                ("done", ToolStatus::Success),
                ("running", ToolStatus::Executing),
                ("waiting", ToolStatus::AwaitingApply),
            ],
        );

        dispatcher.dispatch(
            &mut state,
            StreamEvent::Cancelled {
                timing: Some(Timing {
                    response_duration: Some(1500),
                    ..Timing::default()
                }),
            },
        );

        let message = state.message(&id).expect("message kept");
        assert_eq!(message.content, "partial");
        assert!(!message.local_only);
        assert!(!message.streaming);
        assert_eq!(message.metadata.timing.response_duration, Some(1500));
        assert_eq!(tool_status(&state, &id, "done"), ToolStatus::Success);
        assert_eq!(tool_status(&state, &id, "running"), ToolStatus::Error);
        assert_eq!(tool_status(&state, &id, "waiting"), ToolStatus::Error);
        assert!(state.streaming_message_id.is_none());
        assert!(!state.is_waiting_for_response);
    }

    #[test]
    fn test_cancel_after_id_cleared_uses_last_assistant() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        with_tools(&mut state, &id, &[("t1", ToolStatus::Executing)]);
        let index = state.message_index(&id).expect("index");
        state.update_message(index, |m| m.streaming = false);
        state.streaming_message_id = None;

        dispatcher.dispatch(&mut state, StreamEvent::Cancelled { timing: None });

        assert_eq!(tool_status(&state, &id, "t1"), ToolStatus::Error);
    }

    #[test]
    fn test_error_removes_empty_placeholder() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);

        dispatcher.dispatch(&mut state, StreamEvent::Error { error: None });

        assert!(state.message(&id).is_none());
        assert_eq!(state.len(), 1);
        assert_eq!(state.total_messages, 1);
        let error = state.error.clone().expect("error recorded");
        assert_eq!(error.code, "STREAM_ERROR");
        assert!(!state.is_streaming);
        assert!(!state.is_waiting_for_response);
    }

    #[test]
    fn test_error_keeps_partial_message() {
        let mut dispatcher = dispatcher();
        let (mut state, id) = started(&mut dispatcher);
        dispatcher.dispatch(&mut state, chunk(vec![ContentPart::text("half")]));

        dispatcher.dispatch(
            &mut state,
            StreamEvent::Error {
                error: Some(StreamError::new("RATE_LIMIT", "slow down")),
            },
        );

        let message = state.message(&id).expect("message kept");
        assert!(!message.streaming);
        assert_eq!(
            state.error.as_ref().map(|e| e.code.as_str()),
            Some("RATE_LIMIT")
        );
    }
}

use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use chatstream_core::app::collaborators::{Collaborators, SequentialIdGenerator};
use chatstream_core::app::domain::{ChatSession, ChatStoreState, ChunkDispatcher, StreamEvent};
use chatstream_core::preferences::Preferences;
use eyre::Result;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Model name used when neither the command line nor preferences set one.
pub const FALLBACK_MODEL: &str = "default";

/// One line of a replay transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    /// The user sent a message; starts a new turn.
    User { text: String },
    Event(StreamEvent),
}

#[derive(Deserialize)]
struct UserLine {
    text: String,
}

/// Parse a JSON Lines transcript. Blank lines and `#` comments are skipped.
pub fn parse_transcript(input: &str) -> Result<Vec<TranscriptEntry>, Error> {
    let mut entries = Vec::new();
    for (n, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let invalid = |e: serde_json::Error| Error::Transcript {
            line: n + 1,
            message: e.to_string(),
        };

        let value: serde_json::Value = serde_json::from_str(line).map_err(invalid)?;
        let entry = if value.get("kind").and_then(|k| k.as_str()) == Some("user") {
            let user: UserLine = serde_json::from_value(value).map_err(invalid)?;
            TranscriptEntry::User { text: user.text }
        } else {
            TranscriptEntry::Event(serde_json::from_value(value).map_err(invalid)?)
        };
        entries.push(entry);
    }
    Ok(entries)
}

pub struct ReplayCommand {
    pub file: PathBuf,
    pub max_window: Option<usize>,
    pub model: Option<String>,
    pub summary: bool,
    pub preferences: Preferences,
}

#[async_trait]
impl Command for ReplayCommand {
    async fn execute(&self) -> Result<()> {
        let mut stdout = std::io::stdout();
        self.run(&mut stdout).map_err(Into::into)
    }
}

impl ReplayCommand {
    pub fn run(&self, out: &mut impl Write) -> std::result::Result<(), Error> {
        let state = self.replay_file(&self.file)?;
        if self.summary {
            writeln!(out, "{}", summarize(&state))?;
        } else {
            writeln!(out, "{}", serde_json::to_string_pretty(&state)?)?;
        }
        Ok(())
    }

    fn model_name(&self) -> String {
        self.model
            .clone()
            .or_else(|| self.preferences.model.default_model.clone())
            .unwrap_or_else(|| FALLBACK_MODEL.to_string())
    }

    fn max_window(&self) -> usize {
        self.max_window
            .map(|max| max.max(1))
            .unwrap_or_else(|| self.preferences.max_window_messages())
    }

    pub fn replay_file(&self, path: &Path) -> std::result::Result<ChatStoreState, Error> {
        let input = std::fs::read_to_string(path)?;
        let entries = parse_transcript(&input)?;
        tracing::info!(
            target: "chatstream::replay",
            path = %path.display(),
            entries = entries.len(),
            "Replaying transcript"
        );
        Ok(self.replay(entries))
    }

    pub fn replay(&self, entries: Vec<TranscriptEntry>) -> ChatStoreState {
        let collaborators = Collaborators::new(self.model_name())
            .with_id_generator(Arc::new(SequentialIdGenerator::new("msg")));
        let dispatcher =
            ChunkDispatcher::new(collaborators).with_max_window_messages(self.max_window());
        let mut session = ChatSession::new(dispatcher);

        for entry in entries {
            match entry {
                TranscriptEntry::User { text } => {
                    session.begin_turn(&text);
                }
                TranscriptEntry::Event(event) => session.apply(event),
            }
        }
        session.into_state()
    }
}

pub fn summarize(state: &ChatStoreState) -> String {
    let tools = state.all_messages.iter().map(|m| m.tools.len()).sum::<usize>();
    let error = state
        .error
        .as_ref()
        .map_or_else(|| "none".to_string(), |e| e.code.clone());
    format!(
        "messages={} visible={} tools={} window_start={} total={} folded={} checkpoints={} streaming={} error={}",
        state.len(),
        state.visible_messages().count(),
        tools,
        state.window_start_index,
        state.total_messages,
        state.folded_message_count,
        state.checkpoints.len(),
        state.is_streaming,
        error,
    )
}

use std::sync::Arc;

use shared::{
    domain::{ChatRole, ConnectionStatus, SessionId, SessionStatus},
    protocol::{
        AiResponsePayload, AiStatusPayload, AiTokenPayload, StatePayload, TopicPayload,
        TranscriptChunkPayload,
    },
};
use tracing::{debug, info};

use crate::{
    clock::{Clock, SystemClock},
    paragraphs::{FragmentOutcome, ParagraphEngine, TranscriptFragment},
    streaming::{AiMessage, TokenAggregator},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMarker {
    pub text: String,
    pub timestamp: i64,
}

pub struct SessionStore {
    session_id: SessionId,
    connection_status: ConnectionStatus,
    session_status: Option<SessionStatus>,
    transcript: ParagraphEngine,
    topics: Vec<TopicMarker>,
    ai: TokenAggregator,
    last_error: Option<String>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(session_id: SessionId, break_threshold_ms: i64) -> Self {
        Self::with_clock(session_id, break_threshold_ms, Arc::new(SystemClock))
    }

    pub fn with_clock(session_id: SessionId, break_threshold_ms: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_id,
            connection_status: ConnectionStatus::Disconnected,
            session_status: None,
            transcript: ParagraphEngine::new(break_threshold_ms),
            topics: Vec::new(),
            ai: TokenAggregator::new(),
            last_error: None,
            clock,
        }
    }

    /// Returns whether the snapshot changed the session status.
    pub fn apply_snapshot(&mut self, state: StatePayload) -> bool {
        let now = self.clock.now_ms();
        self.transcript.replace_with_lines(&state.transcript, now);
        self.topics = state
            .topics
            .into_iter()
            .filter(|topic| !topic.text.trim().is_empty())
            .map(|topic| TopicMarker {
                text: topic.text,
                timestamp: topic.ts.unwrap_or(now),
            })
            .collect();
        let history = state
            .ai_messages
            .into_iter()
            .filter(|message| message.role == ChatRole::Assistant)
            .map(|message| AiMessage {
                kind: message.kind.unwrap_or_default(),
                content: message.content,
                timestamp: message.ts.unwrap_or(now),
                streaming: false,
            })
            .collect();
        self.ai.replace_history(history);
        let status_changed = state
            .status
            .is_some_and(|status| self.set_session_status(status));
        info!(
            session_id = %self.session_id,
            paragraphs = self.transcript.len(),
            topics = self.topics.len(),
            ai_messages = self.ai.messages().len(),
            "store: applied snapshot"
        );
        status_changed
    }

    pub fn append_transcript_fragment(&mut self, chunk: TranscriptChunkPayload) -> FragmentOutcome {
        if !chunk.is_final {
            self.transcript.set_interim(&chunk.text);
            return FragmentOutcome::Interim;
        }
        self.transcript.clear_interim();
        let timestamp = chunk.ts.unwrap_or_else(|| self.clock.now_ms());
        self.transcript.push_fragment(TranscriptFragment {
            text: chunk.text,
            timestamp,
            source: chunk.source,
        })
    }

    pub fn append_topic(&mut self, topic: TopicPayload) -> Option<&TopicMarker> {
        let text = topic.text.trim();
        if text.is_empty() {
            return None;
        }
        let timestamp = topic.ts.unwrap_or_else(|| self.clock.now_ms());
        self.topics.push(TopicMarker {
            text: text.to_string(),
            timestamp,
        });
        self.topics.last()
    }

    pub fn append_or_merge_ai_token(&mut self, token: &AiTokenPayload) -> Option<usize> {
        let now = self.clock.now_ms();
        self.ai.push_token(token, now)
    }

    pub fn apply_ai_status(&mut self, status: &AiStatusPayload) -> Option<usize> {
        let now = self.clock.now_ms();
        self.ai.apply_status(status.status, status.kind, now)
    }

    pub fn finalize_ai_message(&mut self, response: &AiResponsePayload) -> Option<usize> {
        let now = self.clock.now_ms();
        self.ai.finalize(response, now)
    }

    /// Returns whether the status actually changed.
    pub fn set_connection_status(&mut self, status: ConnectionStatus) -> bool {
        if self.connection_status == status {
            return false;
        }
        debug!(
            session_id = %self.session_id,
            from = ?self.connection_status,
            to = ?status,
            "store: connection status changed"
        );
        self.connection_status = status;
        self.transcript.clear_interim();
        true
    }

    pub fn set_session_status(&mut self, status: SessionStatus) -> bool {
        self.transcript.clear_interim();
        if self.session_status == Some(status) {
            return false;
        }
        self.session_status = Some(status);
        true
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn replace_transcript(&mut self, lines: &[String]) {
        let now = self.clock.now_ms();
        self.transcript.replace_with_lines(lines, now);
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection_status
    }

    pub fn session_status(&self) -> Option<SessionStatus> {
        self.session_status
    }

    pub fn transcript(&self) -> &ParagraphEngine {
        &self.transcript
    }

    pub fn final_transcript(&self) -> &str {
        self.transcript.final_transcript()
    }

    pub fn topics(&self) -> &[TopicMarker] {
        &self.topics
    }

    pub fn ai_messages(&self) -> &[AiMessage] {
        self.ai.messages()
    }

    pub fn ai(&self) -> &TokenAggregator {
        &self.ai
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;

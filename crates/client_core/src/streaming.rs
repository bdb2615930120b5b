use shared::{
    domain::AiRequestKind,
    protocol::{AiResponsePayload, AiStatus, AiTokenPayload},
};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiMessage {
    pub kind: AiRequestKind,
    pub content: String,
    pub timestamp: i64,
    pub streaming: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    Running,
    Streaming,
    Finalized,
}

#[derive(Debug, Clone, Default)]
pub struct TokenAggregator {
    messages: Vec<AiMessage>,
    active: Option<usize>,
    // Entry settled by a `done`/`error` status that a late response may still overwrite.
    awaiting_response: Option<usize>,
}

impl TokenAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, kind: AiRequestKind, now: i64) -> usize {
        self.awaiting_response = None;
        if let Some(index) = self.active {
            return index;
        }
        self.open(kind, now)
    }

    pub fn push_token(&mut self, token: &AiTokenPayload, now: i64) -> Option<usize> {
        if token.token.is_empty() {
            return None;
        }
        self.awaiting_response = None;
        let index = match self.active {
            Some(index) => index,
            None => self.open(token.kind.unwrap_or_default(), token.ts.unwrap_or(now)),
        };
        let message = &mut self.messages[index];
        message.content.push_str(&token.token);
        if let Some(kind) = token.kind {
            message.kind = kind;
        }
        if let Some(ts) = token.ts {
            message.timestamp = ts;
        }
        Some(index)
    }

    pub fn finalize(&mut self, response: &AiResponsePayload, now: i64) -> Option<usize> {
        let target = self.active.take().or_else(|| self.awaiting_response.take());
        let Some(index) = target else {
            if response.content.trim().is_empty() {
                return None;
            }
            self.messages.push(AiMessage {
                kind: response.kind.unwrap_or_default(),
                content: response.content.clone(),
                timestamp: response.ts.unwrap_or(now),
                streaming: false,
            });
            return Some(self.messages.len() - 1);
        };

        let message = &mut self.messages[index];
        // An empty response keeps whatever the tokens delivered.
        if !response.content.trim().is_empty() {
            message.content = response.content.clone();
        }
        if let Some(kind) = response.kind {
            message.kind = kind;
        }
        if let Some(ts) = response.ts {
            message.timestamp = ts;
        }
        message.streaming = false;
        debug!(index, "ai: finalized streamed message");
        Some(index)
    }

    pub fn apply_status(
        &mut self,
        status: AiStatus,
        kind: Option<AiRequestKind>,
        now: i64,
    ) -> Option<usize> {
        match status {
            AiStatus::Running => Some(self.begin(kind.unwrap_or_default(), now)),
            AiStatus::Done | AiStatus::Error => {
                let index = self.active.take()?;
                self.messages[index].streaming = false;
                self.awaiting_response = Some(index);
                Some(index)
            }
            AiStatus::Unknown => None,
        }
    }

    pub fn replace_history(&mut self, messages: Vec<AiMessage>) {
        self.messages = messages
            .into_iter()
            .map(|mut message| {
                message.streaming = false;
                message
            })
            .collect();
        self.active = None;
        self.awaiting_response = None;
    }

    pub fn phase(&self) -> TurnPhase {
        match self.active {
            Some(index) if self.messages[index].content.is_empty() => TurnPhase::Running,
            Some(_) => TurnPhase::Streaming,
            None if self.messages.is_empty() => TurnPhase::Idle,
            None => TurnPhase::Finalized,
        }
    }

    pub fn messages(&self) -> &[AiMessage] {
        &self.messages
    }

    pub fn active(&self) -> Option<&AiMessage> {
        self.active.map(|index| &self.messages[index])
    }

    pub fn streaming_count(&self) -> usize {
        self.messages.iter().filter(|m| m.streaming).count()
    }

    fn open(&mut self, kind: AiRequestKind, timestamp: i64) -> usize {
        self.messages.push(AiMessage {
            kind,
            content: String::new(),
            timestamp,
            streaming: true,
        });
        let index = self.messages.len() - 1;
        self.active = Some(index);
        index
    }
}

#[cfg(test)]
#[path = "tests/streaming_tests.rs"]
mod tests;

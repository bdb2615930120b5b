use shared::{
    domain::{AiRequestKind, ChatRole, SessionId},
    protocol::{AiRequestCommand, ChatMessage, EndCommand, JoinCommand, OutboundCommand, WireFrame},
};

use crate::{error::ConsoleError, paragraphs::Paragraph, router::emit_any};

pub const DEFAULT_CONTEXT_PARAGRAPHS: usize = 6;

#[derive(Debug, Clone)]
pub struct CommandEmitter {
    session_id: SessionId,
    join_code: Option<String>,
    device_type: String,
    context_paragraphs: usize,
}

impl CommandEmitter {
    pub fn new(
        session_id: SessionId,
        join_code: Option<String>,
        device_type: impl Into<String>,
        context_paragraphs: usize,
    ) -> Self {
        Self {
            session_id,
            join_code,
            device_type: device_type.into(),
            context_paragraphs,
        }
    }

    pub fn join(&self) -> Result<Vec<WireFrame>, ConsoleError> {
        self.ensure_session_id()?;
        let command = JoinCommand {
            session_id: self.session_id.clone(),
            join_code: self
                .join_code
                .as_ref()
                .filter(|code| !code.trim().is_empty())
                .cloned(),
            device_type: self.device_type.clone(),
        };
        Ok(emit_any(OutboundCommand::Join, &command))
    }

    /// `transcript` is the chronological paragraph list; only its tail is sent.
    pub fn ai_request(
        &self,
        kind: AiRequestKind,
        transcript: &[Paragraph],
        user_input: Option<&str>,
    ) -> Result<Vec<WireFrame>, ConsoleError> {
        self.ensure_session_id()?;
        let command = AiRequestCommand {
            session_id: self.session_id.clone(),
            kind,
            messages: self.context_messages(transcript, user_input),
        };
        Ok(emit_any(OutboundCommand::AiRequest, &command))
    }

    pub fn end(&self) -> Result<Vec<WireFrame>, ConsoleError> {
        self.ensure_session_id()?;
        let command = EndCommand {
            session_id: self.session_id.clone(),
        };
        Ok(emit_any(OutboundCommand::End, &command))
    }

    fn context_messages(&self, transcript: &[Paragraph], user_input: Option<&str>) -> Vec<ChatMessage> {
        let start = transcript.len().saturating_sub(self.context_paragraphs);
        let context = transcript[start..]
            .iter()
            .map(|paragraph| paragraph.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let mut messages = Vec::with_capacity(2);
        if !context.is_empty() {
            messages.push(ChatMessage {
                role: ChatRole::User,
                content: context,
            });
        }
        if let Some(input) = user_input.map(str::trim).filter(|input| !input.is_empty()) {
            messages.push(ChatMessage {
                role: ChatRole::User,
                content: input.to_string(),
            });
        }
        messages
    }

    fn ensure_session_id(&self) -> Result<(), ConsoleError> {
        if self.session_id.is_blank() {
            return Err(ConsoleError::MissingSessionId);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;

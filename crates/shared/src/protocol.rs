use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AiRequestKind, ChatRole, SessionId, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEvent {
    Joined,
    Error,
    State,
    TranscriptChunk,
    TopicEvent,
    AiResponse,
    AiToken,
    AiStatus,
    SessionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundCommand {
    Join,
    AiRequest,
    End,
}

// Current spelling first, legacy second.
const INBOUND_ALIASES: &[(InboundEvent, [&str; 2])] = &[
    (InboundEvent::Joined, ["session:joined", "session_joined"]),
    (InboundEvent::Error, ["session:error", "session_error"]),
    (InboundEvent::State, ["session:state", "session_state"]),
    (
        InboundEvent::TranscriptChunk,
        ["transcript:chunk", "transcript_chunk"],
    ),
    (InboundEvent::TopicEvent, ["topic:event", "topic_event"]),
    (InboundEvent::AiResponse, ["ai:response", "ai_response"]),
    (InboundEvent::AiToken, ["ai:token", "ai_token"]),
    (InboundEvent::AiStatus, ["ai:status", "ai_status"]),
    (InboundEvent::SessionStatus, ["session:status", "session_status"]),
];

const OUTBOUND_ALIASES: &[(OutboundCommand, [&str; 2])] = &[
    (OutboundCommand::Join, ["session:join", "session_join"]),
    (OutboundCommand::AiRequest, ["ai:request", "ai_request"]),
    (OutboundCommand::End, ["session:end", "session_end"]),
];

impl InboundEvent {
    pub const ALL: [InboundEvent; 9] = [
        Self::Joined,
        Self::Error,
        Self::State,
        Self::TranscriptChunk,
        Self::TopicEvent,
        Self::AiResponse,
        Self::AiToken,
        Self::AiStatus,
        Self::SessionStatus,
    ];

    pub fn canonical(self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Error => "error",
            Self::State => "state",
            Self::TranscriptChunk => "transcript_chunk",
            Self::TopicEvent => "topic_event",
            Self::AiResponse => "ai_response",
            Self::AiToken => "ai_token",
            Self::AiStatus => "ai_status",
            Self::SessionStatus => "session_status",
        }
    }

    pub fn wire_names(self) -> [&'static str; 2] {
        INBOUND_ALIASES
            .iter()
            .find(|(event, _)| *event == self)
            .map(|(_, names)| *names)
            .unwrap_or([self.canonical(), self.canonical()])
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        INBOUND_ALIASES
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(event, _)| *event)
    }
}

impl OutboundCommand {
    pub fn canonical(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::AiRequest => "ai_request",
            Self::End => "end",
        }
    }

    pub fn wire_names(self) -> [&'static str; 2] {
        OUTBOUND_ALIASES
            .iter()
            .find(|(command, _)| *command == self)
            .map(|(_, names)| *names)
            .unwrap_or([self.canonical(), self.canonical()])
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        OUTBOUND_ALIASES
            .iter()
            .find(|(_, names)| names.contains(&name))
            .map(|(command, _)| *command)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunkPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default = "default_true")]
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponsePayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AiRequestKind>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiTokenPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AiRequestKind>,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiStatus {
    Running,
    Done,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiStatusPayload {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AiRequestKind>,
    pub status: AiStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AiRequestKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePayload {
    #[serde(default)]
    pub transcript: Vec<String>,
    #[serde(default)]
    pub topics: Vec<TopicPayload>,
    #[serde(default)]
    pub ai_messages: Vec<SnapshotMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusPayload {
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCommand {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
    pub device_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiRequestCommand {
    pub session_id: SessionId,
    #[serde(rename = "type")]
    pub kind: AiRequestKind,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndCommand {
    pub session_id: SessionId,
}

/// Body of `GET /api/sessions/{id}/transcript`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResponse {
    #[serde(default)]
    pub transcript: Vec<String>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;

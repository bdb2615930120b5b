use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::{AiRequestKind, ConnectionStatus, SessionId, SessionStatus},
    error::ServerErrorPayload,
    protocol::{
        AiResponsePayload, AiStatusPayload, AiTokenPayload, InboundEvent, SessionStatusPayload,
        StatePayload, TopicPayload, TranscriptChunkPayload, TranscriptResponse, WireFrame,
    },
};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

pub mod clock;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod error;
pub mod paragraphs;
pub mod router;
pub mod store;
pub mod streaming;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::CommandEmitter;
pub use config::{load_settings, ConsoleSettings};
pub use credentials::{CredentialProvider, FileTokenStore, MemoryTokenStore, TokenStore};
pub use error::ConsoleError;
pub use paragraphs::{FragmentOutcome, Paragraph, ParagraphEngine};
pub use router::EventRouter;
pub use store::{SessionStore, TopicMarker};
pub use streaming::{AiMessage, TokenAggregator};
pub use transport::{ChannelTransport, TransportEvent, WsTransport};

const UPDATE_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub join_code: Option<String>,
    pub auth_token: Option<String>,
}

impl SessionHandle {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: SessionId::new(session_id),
            join_code: None,
            auth_token: None,
        }
    }

    pub fn with_join_code(mut self, join_code: impl Into<String>) -> Self {
        self.join_code = Some(join_code.into());
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleUpdate {
    ConnectionChanged(ConnectionStatus),
    SessionStatusChanged(SessionStatus),
    SnapshotApplied {
        paragraphs: usize,
        topics: usize,
        ai_messages: usize,
    },
    ParagraphStarted(Paragraph),
    ParagraphExtended(Paragraph),
    InterimChanged(Option<String>),
    TopicAdded(TopicMarker),
    AiMessageUpdated {
        index: usize,
        message: AiMessage,
    },
    TranscriptReplaced {
        paragraphs: usize,
    },
    Error(String),
}

pub type StoreRouter = EventRouter<SessionStore, Vec<ConsoleUpdate>>;

fn decode<T: DeserializeOwned>(event: InboundEvent, data: &Value) -> Option<T> {
    match serde_json::from_value::<T>(data.clone()) {
        Ok(payload) => Some(payload),
        Err(err) => {
            warn!(event = event.canonical(), %err, "console: dropping malformed event");
            None
        }
    }
}

fn ai_update(store: &SessionStore, index: Option<usize>) -> Vec<ConsoleUpdate> {
    index
        .and_then(|index| {
            store
                .ai_messages()
                .get(index)
                .map(|message| ConsoleUpdate::AiMessageUpdated {
                    index,
                    message: message.clone(),
                })
        })
        .into_iter()
        .collect()
}

pub fn register_store_handlers(router: &mut StoreRouter) {
    router.on_any(InboundEvent::Joined, |store: &mut SessionStore, _data: &Value| {
        store.clear_error();
        if store.set_connection_status(ConnectionStatus::Joined) {
            info!(session_id = %store.session_id(), "console: joined session");
            vec![ConsoleUpdate::ConnectionChanged(ConnectionStatus::Joined)]
        } else {
            Vec::new()
        }
    });

    router.on_any(InboundEvent::Error, |store: &mut SessionStore, data: &Value| {
        let message = match data {
            Value::String(message) => message.clone(),
            other => match decode::<ServerErrorPayload>(InboundEvent::Error, other) {
                Some(payload) => payload.display_message(),
                None => return Vec::new(),
            },
        };
        warn!(session_id = %store.session_id(), %message, "console: server reported error");
        store.record_error(message.clone());
        vec![ConsoleUpdate::Error(message)]
    });

    router.on_any(InboundEvent::State, |store: &mut SessionStore, data: &Value| {
        let Some(state) = decode::<StatePayload>(InboundEvent::State, data) else {
            return Vec::new();
        };
        let status_changed = store.apply_snapshot(state);
        let mut updates = vec![ConsoleUpdate::SnapshotApplied {
            paragraphs: store.transcript().len(),
            topics: store.topics().len(),
            ai_messages: store.ai_messages().len(),
        }];
        if let Some(status) = store.session_status().filter(|_| status_changed) {
            updates.push(ConsoleUpdate::SessionStatusChanged(status));
        }
        updates
    });

    router.on_any(
        InboundEvent::TranscriptChunk,
        |store: &mut SessionStore, data: &Value| {
            let Some(chunk) = decode::<TranscriptChunkPayload>(InboundEvent::TranscriptChunk, data)
            else {
                return Vec::new();
            };
            let had_interim = store.transcript().interim().is_some();
            let outcome = store.append_transcript_fragment(chunk);
            let mut updates = Vec::new();
            match outcome {
                FragmentOutcome::Interim => {
                    updates.push(ConsoleUpdate::InterimChanged(
                        store.transcript().interim().map(str::to_string),
                    ));
                    return updates;
                }
                _ if had_interim => updates.push(ConsoleUpdate::InterimChanged(None)),
                _ => {}
            }
            if let Some(current) = store.transcript().current() {
                match outcome {
                    FragmentOutcome::Started { .. } => {
                        updates.push(ConsoleUpdate::ParagraphStarted(current.clone()))
                    }
                    FragmentOutcome::Extended { .. } => {
                        updates.push(ConsoleUpdate::ParagraphExtended(current.clone()))
                    }
                    _ => {}
                }
            }
            updates
        },
    );

    router.on_any(InboundEvent::TopicEvent, |store: &mut SessionStore, data: &Value| {
        let Some(topic) = decode::<TopicPayload>(InboundEvent::TopicEvent, data) else {
            return Vec::new();
        };
        store
            .append_topic(topic)
            .cloned()
            .map(ConsoleUpdate::TopicAdded)
            .into_iter()
            .collect()
    });

    router.on_any(InboundEvent::AiResponse, |store: &mut SessionStore, data: &Value| {
        let Some(response) = decode::<AiResponsePayload>(InboundEvent::AiResponse, data) else {
            return Vec::new();
        };
        let index = store.finalize_ai_message(&response);
        ai_update(store, index)
    });

    router.on_any(InboundEvent::AiToken, |store: &mut SessionStore, data: &Value| {
        let Some(token) = decode::<AiTokenPayload>(InboundEvent::AiToken, data) else {
            return Vec::new();
        };
        let index = store.append_or_merge_ai_token(&token);
        ai_update(store, index)
    });

    router.on_any(InboundEvent::AiStatus, |store: &mut SessionStore, data: &Value| {
        let Some(status) = decode::<AiStatusPayload>(InboundEvent::AiStatus, data) else {
            return Vec::new();
        };
        let index = store.apply_ai_status(&status);
        ai_update(store, index)
    });

    router.on_any(
        InboundEvent::SessionStatus,
        |store: &mut SessionStore, data: &Value| {
            let Some(payload) = decode::<SessionStatusPayload>(InboundEvent::SessionStatus, data)
            else {
                return Vec::new();
            };
            let had_interim = store.transcript().interim().is_some();
            let mut updates = Vec::new();
            if store.set_session_status(payload.status) {
                info!(
                    session_id = %store.session_id(),
                    status = ?payload.status,
                    "console: session status changed"
                );
                updates.push(ConsoleUpdate::SessionStatusChanged(payload.status));
            }
            if had_interim {
                updates.push(ConsoleUpdate::InterimChanged(None));
            }
            updates
        },
    );
}

pub struct SessionConsole<T: ChannelTransport = WsTransport> {
    handle: SessionHandle,
    settings: ConsoleSettings,
    credentials: CredentialProvider,
    transport: T,
    inbound: Option<mpsc::Receiver<TransportEvent>>,
    router: StoreRouter,
    store: SessionStore,
    emitter: CommandEmitter,
    http: Client,
    updates: broadcast::Sender<ConsoleUpdate>,
    completion_pending: bool,
}

impl SessionConsole<WsTransport> {
    pub fn open(handle: SessionHandle, settings: ConsoleSettings) -> Result<Self, ConsoleError> {
        Self::new(handle, settings, WsTransport::new())
    }
}

impl<T: ChannelTransport> SessionConsole<T> {
    pub fn new(
        handle: SessionHandle,
        settings: ConsoleSettings,
        transport: T,
    ) -> Result<Self, ConsoleError> {
        if handle.session_id.is_blank() {
            return Err(ConsoleError::MissingSessionId);
        }

        let durable: Arc<dyn TokenStore> = match settings.token_file_path() {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::new()),
        };
        let credentials = CredentialProvider::new(
            handle.auth_token.clone(),
            Arc::new(MemoryTokenStore::new()),
            durable,
        );
        let emitter = CommandEmitter::new(
            handle.session_id.clone(),
            handle.join_code.clone(),
            settings.device_type.clone(),
            settings.context_paragraphs,
        );
        let store = SessionStore::new(handle.session_id.clone(), settings.paragraph_break_ms);
        let mut router = StoreRouter::new();
        register_store_handlers(&mut router);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);

        Ok(Self {
            handle,
            settings,
            credentials,
            transport,
            inbound: None,
            router,
            store,
            emitter,
            http: Client::new(),
            updates,
            completion_pending: false,
        })
    }

    pub fn with_credentials(mut self, credentials: CredentialProvider) -> Self {
        self.credentials = credentials;
        self
    }

    /// Rebuilds the (still empty) store around `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.store = SessionStore::with_clock(
            self.handle.session_id.clone(),
            self.settings.paragraph_break_ms,
            clock,
        );
        self
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConsoleUpdate> {
        self.updates.subscribe()
    }

    pub async fn connect(&mut self) -> Result<(), ConsoleError> {
        self.transition(ConnectionStatus::Connecting);
        let token = self.credentials.resolve();
        let url = match self.settings.socket_url(
            &self.handle.session_id,
            self.handle.join_code.as_deref(),
            token.as_deref(),
        ) {
            Ok(url) => url,
            Err(err) => {
                self.fail_connection(err.to_string());
                return Err(err);
            }
        };

        match self.transport.connect(&url, token.as_deref()).await {
            Ok(inbound) => {
                self.inbound = Some(inbound);
                self.router.reset_mirror_window();
                self.store.clear_error();
                self.transition(ConnectionStatus::Connected);
            }
            Err(err) => {
                let message = format!("{err:#}");
                error!(session_id = %self.handle.session_id, %message, "console: connect failed");
                self.fail_connection(message.clone());
                return Err(ConsoleError::Transport(message));
            }
        }

        let frames = self.emitter.join()?;
        self.send_frames(frames)
    }

    /// Cancel-safe. `None` once the channel is gone. A terminal session status
    /// is completed (transcript fetch, then teardown) by the following call.
    pub async fn next_update(&mut self) -> Option<Vec<ConsoleUpdate>> {
        if self.completion_pending {
            return Some(self.complete_session().await);
        }
        let inbound = self.inbound.as_mut()?;
        let event = inbound.recv().await;

        let updates = match event {
            Some(TransportEvent::Frame(frame)) => self.apply_frame(&frame),
            Some(TransportEvent::Disconnected { reason }) => self.handle_disconnect(reason),
            None => self.handle_disconnect(None),
        };
        self.completion_pending = updates.iter().any(|update| {
            matches!(update, ConsoleUpdate::SessionStatusChanged(status) if status.is_terminal())
        });

        self.publish(&updates);
        Some(updates)
    }

    pub fn completion_pending(&self) -> bool {
        self.completion_pending
    }

    pub fn apply_frame(&mut self, frame: &WireFrame) -> Vec<ConsoleUpdate> {
        let (_, results) = self.router.dispatch(&mut self.store, frame);
        results.into_iter().flatten().collect()
    }

    pub fn ask_ai(&mut self, kind: AiRequestKind, user_input: Option<&str>) -> Result<(), ConsoleError> {
        let frames = self
            .emitter
            .ai_request(kind, self.store.transcript().paragraphs(), user_input)?;
        info!(session_id = %self.handle.session_id, kind = kind.as_str(), "console: requesting ai answer");
        self.send_frames(frames)
    }

    pub fn end_session(&mut self) -> Result<(), ConsoleError> {
        let frames = self.emitter.end()?;
        self.send_frames(frames)
    }

    /// Tears the channel down and connects again, which re-joins.
    pub async fn reconnect(&mut self) -> Result<(), ConsoleError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Frames still in flight are never applied after this.
    pub async fn disconnect(&mut self) {
        self.inbound = None;
        self.completion_pending = false;
        self.transport.disconnect().await;
        self.transition(ConnectionStatus::Disconnected);
    }

    pub async fn fetch_final_transcript(&mut self) -> Result<usize, ConsoleError> {
        let url = self.settings.transcript_url(&self.handle.session_id);
        let mut request = self.http.get(&url);
        if let Some(token) = self.credentials.resolve() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| ConsoleError::TranscriptFetch(err.to_string()))?;
        let body: TranscriptResponse = response
            .json()
            .await
            .map_err(|err| ConsoleError::TranscriptFetch(err.to_string()))?;
        self.store.replace_transcript(&body.transcript);
        info!(
            session_id = %self.handle.session_id,
            paragraphs = self.store.transcript().len(),
            "console: replaced transcript with stored copy"
        );
        Ok(self.store.transcript().len())
    }

    async fn complete_session(&mut self) -> Vec<ConsoleUpdate> {
        let mut updates = Vec::new();
        match self.fetch_final_transcript().await {
            Ok(paragraphs) => updates.push(ConsoleUpdate::TranscriptReplaced { paragraphs }),
            Err(err) => {
                warn!(session_id = %self.handle.session_id, %err, "console: keeping live transcript");
                self.store.record_error(err.to_string());
                updates.push(ConsoleUpdate::Error(err.to_string()));
            }
        }
        self.completion_pending = false;
        self.inbound = None;
        updates.extend(self.change_status(ConnectionStatus::Disconnected));
        self.publish(&updates);
        self.transport.disconnect().await;
        updates
    }

    fn handle_disconnect(&mut self, reason: Option<String>) -> Vec<ConsoleUpdate> {
        self.inbound = None;
        let mut updates = Vec::new();
        if let Some(reason) = reason {
            warn!(session_id = %self.handle.session_id, %reason, "console: channel dropped");
            self.store.record_error(reason.clone());
            updates.push(ConsoleUpdate::Error(reason));
        }
        updates.extend(self.change_status(ConnectionStatus::Disconnected));
        updates
    }

    fn send_frames(&mut self, frames: Vec<WireFrame>) -> Result<(), ConsoleError> {
        if !self.transport.is_connected() {
            let err = ConsoleError::NotConnected;
            self.store.record_error(err.to_string());
            self.publish(&[ConsoleUpdate::Error(err.to_string())]);
            return Err(err);
        }
        for frame in &frames {
            if let Err(err) = self.transport.send(frame) {
                self.store.record_error(err.to_string());
                self.publish(&[ConsoleUpdate::Error(err.to_string())]);
                return Err(err);
            }
        }
        Ok(())
    }

    fn fail_connection(&mut self, message: String) {
        self.store.record_error(message.clone());
        let mut updates = vec![ConsoleUpdate::Error(message)];
        updates.extend(self.change_status(ConnectionStatus::Error));
        self.publish(&updates);
    }

    fn change_status(&mut self, status: ConnectionStatus) -> Option<ConsoleUpdate> {
        self.store
            .set_connection_status(status)
            .then_some(ConsoleUpdate::ConnectionChanged(status))
    }

    fn transition(&mut self, status: ConnectionStatus) {
        if let Some(update) = self.change_status(status) {
            self.publish(&[update]);
        }
    }

    fn publish(&self, updates: &[ConsoleUpdate]) {
        for update in updates {
            // No subscribers is fine.
            let _ = self.updates.send(update.clone());
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("session id must not be empty")]
    MissingSessionId,
    #[error("channel is not connected; call connect() first")]
    NotConnected,
    #[error("channel transport failed: {0}")]
    Transport(String),
    #[error("failed to fetch final transcript: {0}")]
    TranscriptFetch(String),
    #[error("server_url must start with http://, https://, ws:// or wss://: {0}")]
    InvalidServerUrl(String),
}

impl ConsoleError {
    /// Connection-level failures leave the console usable for a manual reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Transport(_))
    }
}

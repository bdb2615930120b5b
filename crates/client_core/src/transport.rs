use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use shared::protocol::WireFrame;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ConsoleError;

const INBOUND_BUFFER: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Frame(WireFrame),
    Disconnected { reason: Option<String> },
}

// A dropped connection ends the inbound stream with one `Disconnected`; nothing reconnects.
#[async_trait]
pub trait ChannelTransport: Send {
    async fn connect(
        &mut self,
        url: &Url,
        token: Option<&str>,
    ) -> Result<mpsc::Receiver<TransportEvent>>;

    fn send(&self, frame: &WireFrame) -> Result<(), ConsoleError>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&mut self);
}

#[derive(Default)]
pub struct WsTransport {
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn abort_tasks(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        self.outbound = None;
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn connect(
        &mut self,
        url: &Url,
        token: Option<&str>,
    ) -> Result<mpsc::Receiver<TransportEvent>> {
        // One active connection per console.
        self.abort_tasks();

        let mut request = url
            .as_str()
            .into_client_request()
            .with_context(|| format!("invalid websocket url: {url}"))?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("token is not a valid header value")?;
            request.headers_mut().insert("Authorization", value);
        }

        let (ws_stream, _) = connect_async(request)
            .await
            .with_context(|| format!("failed to connect websocket: {}", url.path()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        info!(path = url.path(), "transport: connected");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let connected = Arc::clone(&self.connected);
        connected.store(true, Ordering::SeqCst);

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if let Err(err) = ws_writer.send(message).await {
                    warn!(%err, "transport: websocket send failed");
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let reader_connected = Arc::clone(&connected);
        let reader = tokio::spawn(async move {
            let mut reason = None;
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WireFrame>(&text) {
                        Ok(frame) => {
                            if inbound_tx.send(TransportEvent::Frame(frame)).await.is_err() {
                                // Console went away; nobody left to apply frames.
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(%err, "transport: dropping malformed frame");
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.to_string()).filter(|r| !r.is_empty());
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        reason = Some(format!("websocket receive failed: {err}"));
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            debug!(?reason, "transport: reader finished");
            let _ = inbound_tx.send(TransportEvent::Disconnected { reason }).await;
        });

        self.outbound = Some(outbound_tx);
        self.reader = Some(reader);
        self.writer = Some(writer);
        Ok(inbound_rx)
    }

    fn send(&self, frame: &WireFrame) -> Result<(), ConsoleError> {
        if !self.is_connected() {
            return Err(ConsoleError::NotConnected);
        }
        let Some(outbound) = &self.outbound else {
            return Err(ConsoleError::NotConnected);
        };
        let text =
            serde_json::to_string(frame).map_err(|err| ConsoleError::Transport(err.to_string()))?;
        outbound
            .send(Message::Text(text))
            .map_err(|_| ConsoleError::Transport("websocket writer has stopped".into()))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&mut self) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.send(Message::Close(None));
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            // Give the close frame a chance to flush before tearing down.
            let _ = tokio::time::timeout(std::time::Duration::from_millis(250), writer).await;
        }
        self.outbound = None;
        self.connected.store(false, Ordering::SeqCst);
        info!("transport: disconnected");
    }
}

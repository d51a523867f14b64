use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

use super::events::{ClientEvent, ServerEvent};

/// Outgoing half of one live socket.
#[async_trait]
pub trait EventSink: Send {
    async fn send(&mut self, event: ClientEvent) -> AppResult<()>;
}

/// Incoming half of one live socket. `next_event` returns `None` once the
/// peer closes.
#[async_trait]
pub trait EventStream: Send {
    async fn next_event(&mut self) -> Option<AppResult<ServerEvent>>;
}

/// The two halves of one established channel connection.
pub struct EventChannel {
    pub sink: Box<dyn EventSink>,
    pub stream: Box<dyn EventStream>,
}

/// Socket factory; the seam that lets tests drive the connection state
/// machine without a network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, token: &str) -> AppResult<EventChannel>;
}

/// Production transport over tokio-tungstenite.
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

type TlsWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, token: &str) -> AppResult<EventChannel> {
        // The token travels as a query parameter. An invalid token shows up
        // as a refused upgrade or an immediate Close, both of which land in
        // the reconnect policy rather than here.
        let sep = if self.url.contains('?') { '&' } else { '?' };
        let url = format!("{}{}token={}", self.url, sep, token);
        let (socket, _) = connect_async(&url)
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;
        debug!(url = %self.url, "channel socket established");
        let (sink, stream) = socket.split();
        Ok(EventChannel {
            sink: Box::new(WsSink { inner: sink }),
            stream: Box::new(WsEventStream { inner: stream }),
        })
    }
}

struct WsSink {
    inner: SplitSink<TlsWebSocket, WsMessage>,
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, event: ClientEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event)?;
        self.inner
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| AppError::Transport(e.to_string()))
    }
}

struct WsEventStream {
    inner: SplitStream<TlsWebSocket>,
}

#[async_trait]
impl EventStream for WsEventStream {
    async fn next_event(&mut self) -> Option<AppResult<ServerEvent>> {
        while let Some(frame) = self.inner.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => return Some(Ok(event)),
                    Err(err) => {
                        // Unknown or malformed frames are dropped, never fatal.
                        warn!(error = %err, "unparseable channel frame");
                    }
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(_)) => return None,
                Ok(_) => debug!("ignoring non-text channel frame"),
                Err(err) => return Some(Err(AppError::Transport(err.to_string()))),
            }
        }
        None
    }
}

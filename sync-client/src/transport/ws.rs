//! WebSocket transport.
//!
//! Wraps a `tokio-tungstenite` connection behind the [`Transport`] trait.
//! Frames map one-to-one onto binary WebSocket messages, so framing comes
//! for free. The stream is split so sending and receiving never contend on
//! one lock: the session loop can sit in `recv()` while `send()` runs from
//! the same or another task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// [`Transport`] over a binary WebSocket connection.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    inner: Arc<WebSocketInner>,
}

#[derive(Debug, Default)]
struct WebSocketInner {
    sink: Mutex<Option<WsSink>>,
    source: Mutex<Option<WsSource>>,
    connected: AtomicBool,
}

impl WebSocketTransport {
    /// Create a transport with no connection yet.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &str) -> Result<(), TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let (sink, source) = stream.split();

        *self.inner.sink.lock().await = Some(sink);
        *self.inner.source.lock().await = Some(source);
        self.inner.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(TransportError::NotConnected)?;

        sink.send(WsMessage::Binary(frame.to_vec().into()))
            .await
            .map_err(|e| {
                self.inner.connected.store(false, Ordering::SeqCst);
                TransportError::SendFailed(e.to_string())
            })
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut source = self.inner.source.lock().await;
        let source = source.as_mut().ok_or(TransportError::NotConnected)?;

        loop {
            match source.next().await {
                Some(Ok(WsMessage::Binary(frame))) => return Ok(frame.to_vec()),
                // Control traffic is handled by tungstenite; skip it.
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.inner.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ConnectionClosed);
                }
                Some(Ok(other)) => {
                    return Err(TransportError::ReceiveFailed(format!(
                        "unexpected websocket message: {other:?}"
                    )));
                }
                Some(Err(e)) => {
                    self.inner.connected.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.source.lock().await.take();
        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            // The peer may already be gone.
            let _ = sink.close().await;
        }
        Ok(())
    }
}

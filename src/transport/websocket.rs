//! WebSocket transport.
//!
//! Packets travel as JSON text frames. Binary frames holding JSON are
//! accepted on receive.
//!
//! # Writer Task
//!
//! Construction spawns a tokio task owning the write half of the socket.
//! [`Transport::send`] only pushes onto an unbounded command channel, so it
//! never blocks; once the writer has stopped, sends are rejected.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, SplitSink};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::Packet;

use super::Transport;

// ============================================================================
// WriterCommand
// ============================================================================

/// Internal commands for the writer task.
enum WriterCommand {
    /// Write a frame.
    Send(Message),
    /// Close the socket and stop.
    Shutdown,
}

// ============================================================================
// WsTransport
// ============================================================================

/// Packet transport over a WebSocket connection.
pub struct WsTransport {
    /// Channel to the writer task.
    outgoing: mpsc::UnboundedSender<WriterCommand>,
    /// Read half of the socket.
    incoming: Mutex<BoxStream<'static, StdResult<Message, WsError>>>,
}

impl WsTransport {
    /// Connects to an engine listening at `url`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `url` is not a `ws://` or `wss://` URL
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid URL {url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::config(format!(
                "unsupported scheme {:?}, expected ws or wss",
                parsed.scheme()
            )));
        }

        let (ws_stream, _) = tokio_tungstenite::connect_async(parsed.as_str()).await?;
        info!(url = %parsed, "WebSocket connection established");

        Ok(Self::from_stream(ws_stream))
    }

    /// Binds a TCP listener for engine-side [`WsTransport::accept_next`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
        let listener = TcpListener::bind(addr).await?;
        debug!(addr = ?listener.local_addr().ok(), "Listening for WebSocket connections");
        Ok(listener)
    }

    /// Accepts the next connection on `listener` and upgrades it.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if accepting the TCP connection fails
    /// - [`Error::WebSocket`] if the upgrade fails
    pub async fn accept_next(listener: &TcpListener) -> Result<Self> {
        let (stream, _) = listener.accept().await?;
        Self::accept(stream).await
    }

    /// Accepts an incoming WebSocket connection on an already accepted TCP
    /// stream (engine side).
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the upgrade fails.
    pub async fn accept(stream: TcpStream) -> Result<Self> {
        let addr = stream.peer_addr().ok();
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        debug!(?addr, "WebSocket connection accepted");

        Ok(Self::from_stream(ws_stream))
    }

    /// Wraps an established WebSocket stream.
    ///
    /// Must be called within a tokio runtime; spawns the writer task.
    pub fn from_stream<S>(ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (ws_write, ws_read) = ws_stream.split();
        let (outgoing, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::run_writer(ws_write, command_rx));

        Self {
            outgoing,
            incoming: Mutex::new(ws_read.boxed()),
        }
    }

    /// Closes the connection gracefully.
    ///
    /// Packets queued before the call are still written.
    pub fn close(&self) {
        let _ = self.outgoing.send(WriterCommand::Shutdown);
    }

    /// Writer loop draining the command channel.
    async fn run_writer<S>(
        mut ws_write: SplitSink<WebSocketStream<S>, Message>,
        mut command_rx: mpsc::UnboundedReceiver<WriterCommand>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        while let Some(command) = command_rx.recv().await {
            match command {
                WriterCommand::Send(message) => {
                    if let Err(e) = ws_write.send(message).await {
                        warn!(error = %e, "Failed to write frame");
                        break;
                    }
                }

                WriterCommand::Shutdown => {
                    debug!("Shutdown command received");
                    let _ = ws_write.close().await;
                    break;
                }
            }
        }

        debug!("Writer task terminated");
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn send(&self, packet: Packet) -> bool {
        let json = match serde_json::to_string(&packet) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, %packet, "Failed to serialize packet");
                return false;
            }
        };

        trace!(%packet, "Queueing packet");
        self.outgoing
            .send(WriterCommand::Send(Message::Text(json.into())))
            .is_ok()
    }

    async fn recv(&self) -> Result<Option<Packet>> {
        let mut ws_read = self.incoming.lock().await;

        loop {
            match ws_read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(serde_json::from_str(&text)?)),

                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(serde_json::from_slice(&bytes)?));
                }

                Some(Ok(Message::Close(_))) => {
                    debug!("WebSocket closed by remote");
                    return Ok(None);
                }

                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }

                Some(Err(e)) => return Err(e.into()),

                // Ignore Ping, Pong, Frame
                Some(Ok(_)) => {}
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::TxId;

    async fn bind() -> (TcpListener, String) {
        let listener = WsTransport::bind("127.0.0.1:0").await.expect("bind should succeed");
        let port = listener.local_addr().expect("local addr").port();
        (listener, format!("ws://127.0.0.1:{port}"))
    }

    #[tokio::test]
    async fn test_bind_in_use_is_io_error() {
        let (listener, _url) = bind().await;
        let addr = listener.local_addr().expect("local addr");

        let result = WsTransport::bind(addr).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_non_ws_scheme() {
        let result = WsTransport::connect("http://127.0.0.1:1").await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_garbage_url() {
        let result = WsTransport::connect("not a url").await;
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_over_websocket() {
        let (listener, url) = bind().await;

        let engine = tokio::spawn(async move {
            let engine = WsTransport::accept_next(&listener).await.expect("accept");

            let request = engine.recv().await.expect("recv").expect("packet");
            let txid = request.txid().expect("txid");
            assert!(engine.send(Packet::respond_execute_ok(txid, 0, true, json!("pong"))));
            engine
        });

        let client = WsTransport::connect(&url).await.expect("connect");
        let txid = TxId::generate();
        assert!(client.send(Packet::call_function(txid, "ping", json!(null))));

        let response = client.recv().await.expect("recv").expect("packet");
        assert_eq!(response.txid().expect("txid"), txid);
        assert_eq!(response.out(), json!("pong"));

        let engine = engine.await.expect("join");
        engine.close();
        assert!(client.recv().await.expect("recv").is_none());
    }

    #[tokio::test]
    async fn test_malformed_frame_is_json_error() {
        let (listener, url) = bind().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            ws.send(Message::Text("{\"packet_type\":\"bogus\"}".into()))
                .await
                .expect("send");
        });

        let client = WsTransport::connect(&url).await.expect("connect");
        let result = client.recv().await;
        assert!(matches!(result, Err(Error::Json(_))));
    }
}

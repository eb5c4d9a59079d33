//! Transport seam between the runtime and the network.
//!
//! The runtime only needs three things from a connection: write a text frame,
//! read the next text frame, close. [`Connector`] opens connections;
//! [`WsConnector`] does it over WebSocket, the harness does it in memory.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};
use tracing::{debug, trace};

use crate::error::TransportError;

/// Opens transports.
pub trait Connector: Send + 'static {
    /// Connection type produced.
    type Transport: Transport;

    /// Connect to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connect`] if the connection or handshake
    /// fails.
    fn connect(
        &mut self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Transport, TransportError>> + Send;
}

/// One open, text-framed, bidirectional connection.
pub trait Transport: Send + 'static {
    /// Write one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the connection is broken.
    fn send(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Next inbound text frame.
    ///
    /// Returns `None` once the connection is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Result<String, TransportError>>> + Send;

    /// Close the connection. Errors are ignored.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector. TLS via rustls with the webpki root store.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector, installing the ring crypto provider if no
    /// process-wide provider is set yet.
    pub fn new() -> Self {
        // Err means another provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WsConnector {
    type Transport = WsTransport;

    async fn connect(&mut self, url: &str) -> Result<WsTransport, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        debug!(url, status = %response.status(), "websocket handshake complete");
        Ok(WsTransport { stream })
    }
}

/// Open WebSocket connection.
pub struct WsTransport {
    stream: WsStream,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        trace!(len = text.len(), "ws send");
        self.stream.send(Message::Text(text)).await.map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Invalid UTF-8 is replaced rather than dropped so the
                // dispatcher reports the frame as malformed.
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(String::from_utf8_lossy(&bytes).into_owned()));
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "server closed websocket");
                    return None;
                },
                // tungstenite answers pings itself
                Ok(_) => {},
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "websocket close failed");
        }
    }
}

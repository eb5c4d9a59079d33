//! In-memory transport.
//!
//! [`memory_link`] returns a connector for the client and a listener for the
//! server. Each `connect` creates a fresh pair of unbounded queues; dropping
//! either end reads as a clean close on the other. The listener can refuse
//! connects outright or stall them, like a server that accepts TCP and never
//! finishes the upgrade.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::mpsc;
use tracing::trace;
use vex_client::{Connector, Transport, TransportError};

/// Client side of a memory link.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<ServerConnection>,
    gate: Arc<Gate>,
}

/// Server side of a memory link.
#[derive(Debug)]
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<ServerConnection>,
    gate: Arc<Gate>,
}

/// Admission policy shared by a connector and its listener.
#[derive(Debug, Default)]
pub(crate) struct Gate {
    refusing: AtomicBool,
    stalling: AtomicBool,
}

impl Gate {
    pub(crate) fn refuse(&self, refuse: bool) {
        self.refusing.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn stall(&self, stall: bool) {
        self.stalling.store(stall, Ordering::SeqCst);
    }
}

/// Create a linked connector/listener pair.
pub fn memory_link() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Gate::default());
    (
        MemoryConnector { incoming: tx, gate: Arc::clone(&gate) },
        MemoryListener { incoming: rx, gate },
    )
}

impl Connector for MemoryConnector {
    type Transport = MemoryTransport;

    async fn connect(&mut self, url: &str) -> Result<MemoryTransport, TransportError> {
        if self.gate.stalling.load(Ordering::SeqCst) {
            trace!(url, "stalling connect");
            std::future::pending::<()>().await;
        }
        if self.gate.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".to_owned()));
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        let connection =
            ServerConnection { url: url.to_owned(), inbound: from_client, outbound: to_client };

        self.incoming
            .send(connection)
            .map_err(|_| TransportError::Connect("no listener".to_owned()))?;

        Ok(MemoryTransport { outbound: Some(to_server), inbound: from_server })
    }
}

/// Client end of one memory connection.
#[derive(Debug)]
pub struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
    inbound: mpsc::UnboundedReceiver<String>,
}

impl Transport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        let outbound =
            self.outbound.as_ref().ok_or_else(|| TransportError::Send("closed".to_owned()))?;
        trace!(%text, "client -> server");
        outbound.send(text).map_err(|_| TransportError::Send("server went away".to_owned()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

impl MemoryListener {
    /// Next connection attempt, or `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.incoming.recv().await
    }

    /// Refuse (`true`) or accept (`false`) new connections.
    pub fn refuse(&self, refuse: bool) {
        self.gate.refuse(refuse);
    }

    /// Leave new connects hanging forever (`true`), or complete them (`false`).
    pub fn stall(&self, stall: bool) {
        self.gate.stall(stall);
    }

    /// Shared admission policy, for handles that outlive the listener's owner.
    pub(crate) fn gate(&self) -> Arc<Gate> {
        Arc::clone(&self.gate)
    }
}

/// Server end of one memory connection.
#[derive(Debug)]
pub struct ServerConnection {
    url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ServerConnection {
    /// URL the client dialed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame from the client, or `None` once it closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }

    /// Send a frame to the client. Returns false if the client is gone.
    pub fn send(&self, text: String) -> bool {
        trace!(%text, "server -> client");
        self.outbound.send(text).is_ok()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut connector, mut listener) = memory_link();
        let mut client = connector.connect("ws://sim/socket").await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.send("hello".into()).await.unwrap();
        assert_eq!(server.recv().await.as_deref(), Some("hello"));
        assert_eq!(server.url(), "ws://sim/socket");

        assert!(server.send("world".into()));
        assert_eq!(client.recv().await.unwrap().unwrap(), "world");
    }

    #[tokio::test]
    async fn dropping_server_end_closes_client() {
        let (mut connector, mut listener) = memory_link();
        let mut client = connector.connect("ws://sim/socket").await.unwrap();
        drop(listener.accept().await);

        assert!(client.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_close_is_seen_by_server() {
        let (mut connector, mut listener) = memory_link();
        let mut client = connector.connect("ws://sim/socket").await.unwrap();
        let mut server = listener.accept().await.unwrap();

        client.close().await;

        assert!(server.recv().await.is_none());
        assert!(client.send("late".into()).await.is_err());
    }

    #[tokio::test]
    async fn refused_connections_fail() {
        let (mut connector, listener) = memory_link();
        listener.refuse(true);

        let result = connector.connect("ws://sim/socket").await;
        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_connections_never_complete() {
        let (mut connector, listener) = memory_link();
        listener.stall(true);

        let attempt = connector.connect("ws://sim/socket");
        let result = tokio::time::timeout(std::time::Duration::from_secs(3600), attempt).await;
        assert!(result.is_err());
    }
}

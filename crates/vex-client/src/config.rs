//! Client configuration.

use std::time::Duration;

use vex_core::SessionConfig;

/// How often the runtime ticks the session for deadlines and heartbeats.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Time a connect attempt has to complete the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration.
///
/// Built with [`ClientConfig::new`] and adjusted with the `with_*` methods:
///
/// ```
/// use vex_client::ClientConfig;
///
/// let config = ClientConfig::new("chat.example.com").with_server_key("ab12");
/// assert_eq!(config.websocket_url(), "wss://chat.example.com/socket");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host, optionally with port (`example.com:8443`)
    pub host: String,
    /// Use TLS (`wss`/`https`)
    pub secure: bool,
    /// Engine timings and the pinned server key
    pub session: SessionConfig,
    /// Interval between runtime ticks
    pub tick_interval: Duration,
    /// Deadline for a connect attempt; expiry counts as a failed connect
    pub connect_timeout: Duration,
    /// Commands buffered between handles and the runtime
    pub command_buffer: usize,
    /// Notifications buffered per subscriber before lagging
    pub notification_buffer: usize,
}

impl ClientConfig {
    /// Secure configuration for `host` with default timings.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            secure: true,
            session: SessionConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_buffer: 64,
            notification_buffer: 256,
        }
    }

    /// Plain `ws`/`http`. Development only.
    #[must_use]
    pub fn insecure(mut self) -> Self {
        self.secure = false;
        self
    }

    /// Trust only this server key (hex-encoded Ed25519 public key).
    #[must_use]
    pub fn with_server_key(mut self, key: impl Into<String>) -> Self {
        self.session.server_key = Some(key.into());
        self
    }

    /// Replace the engine configuration.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Give up on a connect attempt after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// WebSocket endpoint.
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}/socket", self.host)
    }

    /// HTTP base URL for file downloads.
    pub fn http_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}", self.host)
    }

    /// Download URL of an uploaded file.
    pub fn file_url(&self, file_id: &str) -> String {
        format!("{}/file/{file_id}", self.http_url())
    }
}

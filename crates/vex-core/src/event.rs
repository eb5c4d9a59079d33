//! Session events and actions.

use thiserror::Error;
use vex_proto::{Channel, ChatMessage, Frame, Request, User};

use crate::{error::CallError, session::SessionState};

/// Application calls the engine knows how to issue.
///
/// Most operations are a plain [`Call::Rpc`]: build the request, correlate
/// the reply, hand the frame back. The remaining variants need the engine's
/// own state (keys, ledger, caches) before or after the round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// Send a request and resolve with its reply frame.
    Rpc(Request),

    /// Bind our public key to an allocated account id.
    ///
    /// The engine signs `user_id` and records the returned account.
    RegisterIdentity {
        /// Account id returned by `identity/CREATE`.
        user_id: String,
    },

    /// Join a channel; idempotent against the subscription ledger.
    Join {
        /// Target channel.
        channel_id: String,
    },

    /// Leave a channel and forget it in the ledger.
    Leave {
        /// Target channel.
        channel_id: String,
    },

    /// Channel list, served from the cache when one was pushed.
    RetrieveChannels,

    /// Online users of a channel, served from the cache when pushed.
    ActiveUsers {
        /// Target channel.
        channel_id: String,
    },
}

/// Successful outcome of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The server's reply frame.
    Frame(Frame),

    /// Channel list served from the cache.
    Channels(Vec<Channel>),

    /// Online users served from the cache.
    OnlineUsers(Vec<User>),

    /// Join skipped: the channel is already in the ledger.
    AlreadyJoined,

    /// Handshake complete.
    Authenticated {
        /// Pinned server key, hex-encoded.
        server_key: String,
    },
}

/// Events the driver feeds into the session.
///
/// Generic over `W` (the waiter type the driver uses to deliver call results)
/// and `I` (Instant type) so the same engine runs under tokio in production
/// and under a plain clock in unit tests.
#[derive(Debug)]
pub enum SessionEvent<W, I> {
    /// Transport finished connecting.
    TransportOpened {
        /// Current time.
        now: I,
    },

    /// Transport closed cleanly.
    TransportClosed {
        /// Current time.
        now: I,
        /// Close reason, for logging.
        reason: String,
    },

    /// Transport failed to connect, send or receive.
    TransportFailed {
        /// Current time.
        now: I,
        /// Failure description.
        reason: String,
    },

    /// One inbound text frame.
    TextReceived {
        /// Raw frame text.
        text: String,
        /// Current time.
        now: I,
    },

    /// Time tick for deadlines, heartbeat and reconnect delay.
    Tick {
        /// Current time.
        now: I,
    },

    /// Application call.
    Call {
        /// What to do.
        call: Call,
        /// Where to deliver the outcome.
        waiter: W,
        /// Current time.
        now: I,
    },

    /// Application wants the handshake completed.
    Authenticate {
        /// Where to deliver the outcome.
        waiter: W,
        /// Current time.
        now: I,
    },

    /// Application is shutting the session down.
    Logout,
}

/// Actions the session produces for the driver to execute.
#[derive(Debug)]
pub enum SessionAction<W> {
    /// Open the transport.
    Connect,

    /// Write this frame to the transport.
    Send(Frame),

    /// Close the transport. No reconnect follows.
    Close {
        /// Close reason.
        reason: String,
    },

    /// Deliver a call outcome.
    Complete {
        /// The call's waiter.
        waiter: W,
        /// Result.
        outcome: Result<Reply, CallError>,
    },

    /// Publish to subscribers.
    Notify(Notification),
}

/// Out-of-band information for the application.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// First connection opened. Emitted once per session lifetime.
    Ready,

    /// Session state changed.
    StateChanged(SessionState),

    /// Live chat message.
    Chat(ChatMessage),

    /// Channel list pushed.
    ChannelList(Vec<Channel>),

    /// Online users pushed for one channel.
    OnlineList {
        /// Channel the list describes.
        channel_id: String,
        /// Online users.
        users: Vec<User>,
    },

    /// Our account record pushed.
    ClientInfo(User),

    /// History message pushed.
    History(ChatMessage),

    /// Heartbeat pings have gone unanswered.
    LivenessDegraded {
        /// Consecutive unanswered pings.
        missed: u32,
    },

    /// Something went wrong with no caller to report it to.
    Fault(SessionFault),
}

/// Failures reported on the fault stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFault {
    /// Inbound frame could not be parsed or decoded; it was dropped.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Transport failed; the session is reconnecting.
    #[error("transport failure: {0}")]
    Transport(String),

    /// A channel could not be rejoined after reconnect.
    #[error("rejoin of {channel_id} failed: {reason}")]
    ReplayFailed {
        /// Channel that was dropped from the ledger.
        channel_id: String,
        /// Why.
        reason: String,
    },

    /// Automatic re-authentication failed.
    #[error("authentication failed: {0}")]
    Authentication(CallError),
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Lifecycle state.
    pub state: SessionState,
    /// Whether the handshake is complete.
    pub authed: bool,
    /// Our account record, once registered or pushed.
    pub client: Option<User>,
    /// Pinned server key.
    pub server_key: Option<String>,
    /// Channels in the subscription ledger.
    pub channels: Vec<String>,
    /// Requests awaiting a reply.
    pub outstanding: usize,
}

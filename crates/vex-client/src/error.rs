//! Client error types.

use thiserror::Error;
use vex_core::CallError;
use vex_proto::ProtocolError;

/// Failures of the underlying transport.
///
/// The application never sees these directly: the runtime turns them into a
/// reconnect and a [`SessionFault::Transport`](vex_core::SessionFault).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connect failed: {0}")]
    Connect(String),

    /// Could not write a frame
    #[error("send failed: {0}")]
    Send(String),

    /// Read side failed
    #[error("receive failed: {0}")]
    Receive(String),
}

/// Errors returned by [`Client`](crate::Client) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The call failed in the session engine or on the server
    #[error(transparent)]
    Call(#[from] CallError),

    /// The server's reply did not have the expected shape
    #[error("failed to decode reply: {0}")]
    Decode(#[from] ProtocolError),

    /// The engine resolved the call with a reply of the wrong kind
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),

    /// The runtime task has stopped
    #[error("client runtime has shut down")]
    RuntimeClosed,
}

impl ClientError {
    /// Server error code, if the server rejected the call.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Call(err) => err.code(),
            _ => None,
        }
    }

    /// Returns true if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Call(err) if err.is_transient())
    }
}
